use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

use crate::app::{App, InputMode, TurnOutcome, TurnTicket};
use crate::speech::SpeechEvent;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Speech(speech) => handle_speech(app, speech),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Session lifecycle
        KeyCode::Char('s') if !app.session_active => app.start_session(),
        KeyCode::Char('r') if app.session_active => app.restart_session(),

        // Speech capture works in and out of a session; the transcript is
        // only auto-forwarded while a session is active.
        KeyCode::Char('v') => app.start_capture(),

        // Fire-and-log single-transcript path (no session required).
        KeyCode::Char('p') if !app.session_active => send_transcript_for_processing(app),

        // Typed fallback input
        KeyCode::Char('i') if app.session_active => {
            app.input_mode = InputMode::Editing;
        }

        // Turn the conversation into an actual cart.
        KeyCode::Char('f') if app.session_active => submit_finalize_turn(app),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if !app.typed_input.is_empty() {
                let content = std::mem::take(&mut app.typed_input);
                app.typed_cursor = 0;
                app.input_mode = InputMode::Normal;
                submit_chat_turn(app, &content);
            }
        }
        KeyCode::Backspace => {
            if app.typed_cursor > 0 {
                app.typed_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.typed_input, app.typed_cursor);
                app.typed_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.typed_input.chars().count();
            if app.typed_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.typed_input, app.typed_cursor);
                app.typed_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.typed_cursor = app.typed_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.typed_input.chars().count();
            app.typed_cursor = (app.typed_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.typed_cursor = 0;
        }
        KeyCode::End => {
            app.typed_cursor = app.typed_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.typed_input, app.typed_cursor);
            app.typed_input.insert(byte_pos, c);
            app.typed_cursor += 1;
        }
        _ => {}
    }
}

fn handle_speech(app: &mut App, event: SpeechEvent) {
    match event {
        SpeechEvent::Transcript(text) => {
            app.status = None;
            if app.apply_transcript(&text) {
                submit_chat_turn(app, &text);
            }
        }
        SpeechEvent::Ended => {
            info!("speech capture ended");
            app.capturing = false;
            // A capture can end without a transcript; drop the
            // "Listening..." note either way.
            app.status = None;
        }
        SpeechEvent::Error(err) => {
            app.capturing = false;
            app.status = Some(format!("Speech error: {err}"));
        }
    }
}

/// Submits one chat turn: user message and placeholder go into the
/// conversation immediately, the request runs in the background, and the
/// main loop folds the reply in when it lands.
pub fn submit_chat_turn(app: &mut App, content: &str) {
    let TurnTicket {
        seq,
        epoch,
        placeholder_idx,
        messages,
    } = app.begin_chat_turn(content);
    let client = app.client.clone();
    let handle =
        tokio::spawn(async move { client.chat(&messages).await.map(TurnOutcome::Assistant) });
    app.push_pending(seq, epoch, placeholder_idx, handle);
}

fn submit_finalize_turn(app: &mut App) {
    let TurnTicket {
        seq,
        epoch,
        placeholder_idx,
        messages,
    } = app.begin_finalize_turn();
    let client = app.client.clone();
    let handle =
        tokio::spawn(async move { client.finalize(&messages).await.map(TurnOutcome::Finalized) });
    app.push_pending(seq, epoch, placeholder_idx, handle);
}

/// Posts the latest captured transcript to the process endpoint. The
/// response is logged, never folded into the conversation.
fn send_transcript_for_processing(app: &mut App) {
    if app.latest_transcript.is_empty() {
        warn!("no transcript available to send");
        app.status = Some("No transcript available to send".to_string());
        return;
    }
    let client = app.client.clone();
    let transcript = app.latest_transcript.clone();
    tokio::spawn(async move {
        if let Err(err) = client.process(&transcript).await {
            warn!(%err, "voice transcript send failed");
        }
    });
    app.status = Some("Transcript sent for processing".to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::VoiceOrderClient;
    use crate::conversation::Conversation;
    use crate::speech::SpeechCapture;
    use crossterm::event::KeyEvent;
    use tokio::sync::mpsc;

    fn test_app(dir: &tempfile::TempDir) -> App {
        let conversation = Conversation::load(dir.path().join("conversation.json"));
        let client = VoiceOrderClient::new("http://localhost:8000", None);
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(conversation, client, SpeechCapture::new(None, "en-US"), tx)
    }

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::from(code))
    }

    #[test]
    fn typing_updates_input_and_cursor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.start_session();
        handle_event(&mut app, press(KeyCode::Char('i')));
        assert_eq!(app.input_mode, InputMode::Editing);

        for c in "two apples".chars() {
            handle_event(&mut app, press(KeyCode::Char(c)));
        }
        assert_eq!(app.typed_input, "two apples");
        assert_eq!(app.typed_cursor, 10);

        handle_event(&mut app, press(KeyCode::Backspace));
        assert_eq!(app.typed_input, "two apple");

        handle_event(&mut app, press(KeyCode::Home));
        handle_event(&mut app, press(KeyCode::Delete));
        assert_eq!(app.typed_input, "wo apple");
    }

    #[test]
    fn escape_leaves_editing_without_submitting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.start_session();
        handle_event(&mut app, press(KeyCode::Char('i')));
        handle_event(&mut app, press(KeyCode::Char('x')));
        handle_event(&mut app, press(KeyCode::Esc));

        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.conversation.len(), 1); // greeting only
    }

    #[tokio::test]
    async fn enter_submits_typed_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.start_session();
        handle_event(&mut app, press(KeyCode::Char('i')));
        for c in "buy milk".chars() {
            handle_event(&mut app, press(KeyCode::Char(c)));
        }
        handle_event(&mut app, press(KeyCode::Enter));

        assert!(app.typed_input.is_empty());
        assert_eq!(app.input_mode, InputMode::Normal);
        // user message + placeholder appended behind the greeting
        assert_eq!(app.conversation.len(), 3);
        assert!(app.has_pending_turns());
    }

    #[tokio::test]
    async fn enter_with_empty_input_does_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.start_session();
        handle_event(&mut app, press(KeyCode::Char('i')));
        handle_event(&mut app, press(KeyCode::Enter));

        assert_eq!(app.conversation.len(), 1);
        assert!(!app.has_pending_turns());
    }

    #[test]
    fn transcript_outside_session_is_display_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        handle_event(
            &mut app,
            AppEvent::Speech(SpeechEvent::Transcript("buy two apples".into())),
        );

        assert_eq!(app.latest_transcript, "buy two apples");
        assert!(app.conversation.is_empty());
        assert!(!app.has_pending_turns());
    }

    #[tokio::test]
    async fn transcript_inside_session_becomes_a_chat_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.start_session();
        handle_event(
            &mut app,
            AppEvent::Speech(SpeechEvent::Transcript("buy two apples".into())),
        );

        assert_eq!(app.conversation.len(), 3);
        assert_eq!(app.conversation.messages()[1].content, "buy two apples");
        assert!(app.has_pending_turns());
    }

    #[test]
    fn capture_ending_without_transcript_clears_listening_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.capturing = true;
        app.status = Some("Listening...".to_string());

        handle_event(&mut app, AppEvent::Speech(SpeechEvent::Ended));

        assert!(!app.capturing);
        assert_eq!(app.status, None);
    }

    #[test]
    fn speech_error_clears_capture_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        app.capturing = true;
        handle_event(
            &mut app,
            AppEvent::Speech(SpeechEvent::Error("not-allowed".into())),
        );

        assert!(!app.capturing);
        assert!(app.status.as_deref().unwrap_or("").contains("not-allowed"));
        assert!(app.conversation.is_empty());
    }

    #[test]
    fn restart_is_gated_on_an_active_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = test_app(&dir);
        handle_event(&mut app, press(KeyCode::Char('r')));
        assert!(!app.session_active);

        handle_event(&mut app, press(KeyCode::Char('s')));
        assert!(app.session_active);
        assert_eq!(app.conversation.len(), 1);
    }
}
