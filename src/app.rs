use anyhow::{Result, anyhow};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{FINALIZE_FAILURE, FinalizeReply, GENERIC_FAILURE, VoiceOrderClient};
use crate::conversation::{ChatMessage, Conversation};
use crate::speech::{SpeechCapture, SpeechEvent};

/// Assistant seed message shown when a session starts on an empty
/// conversation.
pub const GREETING: &str =
    "Hi! I'm your GShare ordering assistant. What would you like to order today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Resolved result of one backend exchange.
#[derive(Debug)]
pub enum TurnOutcome {
    Assistant(String),
    Finalized(FinalizeReply),
}

/// Bookkeeping handed to the spawner of a turn: the correlation sequence
/// number, the session epoch and placeholder index the reply must match,
/// and the history snapshot to post (the placeholder itself is never
/// sent).
pub struct TurnTicket {
    pub seq: u64,
    pub epoch: u64,
    pub placeholder_idx: usize,
    pub messages: Vec<ChatMessage>,
}

struct PendingTurn {
    seq: u64,
    epoch: u64,
    placeholder_idx: usize,
    handle: JoinHandle<Result<TurnOutcome>>,
}

/// Voice-ordering session state: the conversation, the transcript buffer,
/// the active flag, and the in-flight turns. Owned by the UI loop; no
/// module-level state.
pub struct App {
    pub should_quit: bool,
    pub session_active: bool,
    pub input_mode: InputMode,

    // Typed fallback input
    pub typed_input: String,
    pub typed_cursor: usize,

    // Most recent finalized utterance; cleared when a turn completes.
    pub latest_transcript: String,
    pub capturing: bool,
    pub status: Option<String>,
    pub animation_frame: u8,

    pub conversation: Conversation,
    pub client: VoiceOrderClient,
    pub speech: SpeechCapture,
    pub speech_tx: UnboundedSender<SpeechEvent>,

    pending: Vec<PendingTurn>,
    next_seq: u64,
    // Bumped on restart so replies from a cleared conversation can never
    // resolve into the new one, even at a matching placeholder index.
    epoch: u64,
}

impl App {
    pub fn new(
        conversation: Conversation,
        client: VoiceOrderClient,
        speech: SpeechCapture,
        speech_tx: UnboundedSender<SpeechEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            session_active: false,
            input_mode: InputMode::Normal,
            typed_input: String::new(),
            typed_cursor: 0,
            latest_transcript: String::new(),
            capturing: false,
            status: None,
            animation_frame: 0,
            conversation,
            client,
            speech,
            speech_tx,
            pending: Vec::new(),
            next_seq: 0,
            epoch: 0,
        }
    }

    /// Activates the session and seeds the conversation with the fixed
    /// greeting when it is empty.
    pub fn start_session(&mut self) {
        self.session_active = true;
        if self.conversation.is_empty() {
            self.conversation.append(ChatMessage::assistant(GREETING));
        }
        info!(messages = self.conversation.len(), "voice ordering session started");
    }

    /// Clears all conversation state, persisted copy included, then
    /// starts a fresh session. In-flight turns belong to the cleared
    /// conversation: their requests are aborted and their replies, should
    /// any still land, are stale by epoch.
    pub fn restart_session(&mut self) {
        self.epoch += 1;
        for turn in self.pending.drain(..) {
            turn.handle.abort();
        }
        self.conversation.reset();
        self.latest_transcript.clear();
        self.start_session();
    }

    /// Records a finalized utterance in the transcript buffer and reports
    /// whether it should be auto-forwarded as a chat turn. Forwarding
    /// happens only while a session is active; otherwise the utterance is
    /// display-only.
    pub fn apply_transcript(&mut self, text: &str) -> bool {
        self.latest_transcript = text.to_string();
        self.session_active
    }

    pub fn start_capture(&mut self) {
        if self.speech.is_available() {
            self.capturing = true;
            self.status = Some("Listening...".to_string());
            self.speech.start(self.speech_tx.clone());
        } else {
            self.status = Some("Speech capture is not available".to_string());
        }
    }

    /// Opens a chat turn: appends the user message, snapshots the history
    /// to post, then appends this turn's placeholder.
    pub fn begin_chat_turn(&mut self, content: &str) -> TurnTicket {
        self.conversation.append(ChatMessage::user(content));
        let messages = self.conversation.messages().to_vec();
        self.conversation.append(ChatMessage::thinking());
        self.ticket(messages)
    }

    /// Opens a finalize turn: posts the history as it stands, with only a
    /// placeholder appended for the confirmation.
    pub fn begin_finalize_turn(&mut self) -> TurnTicket {
        let messages = self.conversation.messages().to_vec();
        self.conversation.append(ChatMessage::thinking());
        self.ticket(messages)
    }

    fn ticket(&mut self, messages: Vec<ChatMessage>) -> TurnTicket {
        self.next_seq += 1;
        TurnTicket {
            seq: self.next_seq,
            epoch: self.epoch,
            placeholder_idx: self.conversation.len() - 1,
            messages,
        }
    }

    pub fn push_pending(
        &mut self,
        seq: u64,
        epoch: u64,
        placeholder_idx: usize,
        handle: JoinHandle<Result<TurnOutcome>>,
    ) {
        self.pending.push(PendingTurn {
            seq,
            epoch,
            placeholder_idx,
            handle,
        });
    }

    pub fn has_pending_turns(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Folds a resolved turn back into the conversation. A reply is
    /// applied only when its epoch matches the current session and its
    /// own slot still holds the placeholder, so late replies cannot
    /// clobber a different turn. The transcript buffer is cleared on
    /// success and failure alike so the same utterance is never
    /// resubmitted.
    pub fn complete_turn(&mut self, epoch: u64, placeholder_idx: usize, outcome: Result<TurnOutcome>) {
        if epoch != self.epoch {
            info!(epoch, "dropping reply from a restarted conversation");
            return;
        }
        let reply = match outcome {
            Ok(TurnOutcome::Assistant(text)) => ChatMessage::assistant(text),
            Ok(TurnOutcome::Finalized(reply)) => ChatMessage::assistant(self.finalize_text(reply)),
            Err(err) => {
                error!(%err, "chat turn failed");
                ChatMessage::assistant(GENERIC_FAILURE)
            }
        };
        self.conversation.resolve_placeholder(placeholder_idx, reply);
        self.latest_transcript.clear();
    }

    fn finalize_text(&self, reply: FinalizeReply) -> String {
        if reply.success && reply.cart.is_some() {
            match reply.order_id {
                Some(order_id) => format!(
                    "Order #{order_id} created! View your cart: {}",
                    self.client.cart_url()
                ),
                None => format!("Your cart is ready: {}", self.client.cart_url()),
            }
        } else {
            reply.error.unwrap_or_else(|| FINALIZE_FAILURE.to_string())
        }
    }

    /// Drains finished background turns and folds their outcomes in.
    pub async fn poll_pending(&mut self) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].handle.is_finished() {
                let turn = self.pending.remove(i);
                let outcome = match turn.handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(anyhow!("chat task failed: {err}")),
                };
                info!(seq = turn.seq, "chat turn resolved");
                self.complete_turn(turn.epoch, turn.placeholder_idx, outcome);
            } else {
                i += 1;
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.has_pending_turns() || self.capturing {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}
