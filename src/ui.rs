use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::conversation::{ChatMessage, ChatRole};

/// One rendered conversation message: its lines plus the side it sits on.
/// User bubbles are right-aligned and highlighted, assistant bubbles
/// left-aligned and neutral.
pub struct Bubble {
    pub alignment: Alignment,
    pub lines: Vec<Line<'static>>,
}

/// Pure projection of the message sequence into bubbles, insertion order
/// preserved. One bubble per message.
pub fn build_bubbles(messages: &[ChatMessage]) -> Vec<Bubble> {
    messages
        .iter()
        .map(|msg| match msg.role {
            ChatRole::User => {
                let mut lines = vec![
                    Line::from(Span::styled(
                        "You",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ))
                    .alignment(Alignment::Right),
                ];
                for line in msg.content.lines() {
                    lines.push(
                        Line::from(Span::styled(
                            line.to_string(),
                            Style::default().fg(Color::Cyan),
                        ))
                        .alignment(Alignment::Right),
                    );
                }
                Bubble {
                    alignment: Alignment::Right,
                    lines,
                }
            }
            ChatRole::Assistant => {
                let mut lines = vec![Line::from(Span::styled(
                    "GShare",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ))];
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                Bubble {
                    alignment: Alignment::Left,
                    lines,
                }
            }
        })
        .collect()
}

/// Flattens bubbles into the transcript text, one blank line between
/// bubbles.
fn transcript_lines(messages: &[ChatMessage]) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    for bubble in build_bubbles(messages) {
        lines.extend(bubble.lines);
        lines.push(Line::default());
    }
    lines
}

/// Estimated scroll offset that keeps the newest entry visible after
/// wrapping, mirroring the paragraph's wrap behavior closely enough for
/// chat-sized messages.
fn scroll_to_bottom(lines: &[Line], width: u16, height: u16) -> u16 {
    let wrap_width = width.max(1) as usize;
    let mut total: u16 = 0;
    for line in lines {
        // Use character count, not byte length, for proper UTF-8 handling
        let char_count: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
        // Saturate: a long-lived conversation can outgrow u16 rows.
        let rows = ((char_count / wrap_width) + 1).min(u16::MAX as usize) as u16;
        total = total.saturating_add(rows);
    }
    total.saturating_sub(height)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);

    if app.session_active {
        render_session(app, frame, body_area);
    } else {
        render_start(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" GShare Voice Ordering ", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Start affordance shown while no session is active.
fn render_start(app: &App, frame: &mut Frame, area: Rect) {
    let speech_note = if app.speech.is_available() {
        Span::styled("Speech capture: available", Style::default().fg(Color::Green))
    } else {
        Span::styled(
            "Speech capture: unavailable (set speech_command in the config)",
            Style::default().fg(Color::Red),
        )
    };

    let mut lines = vec![
        Line::default(),
        Line::from(Span::styled(
            "Order your groceries by voice.",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from("Press s to start a voice ordering session."),
        Line::from("Outside a session, v captures an utterance for display only"),
        Line::from("and p sends the captured transcript for processing."),
        Line::default(),
        Line::from(speech_note),
    ];

    lines.push(Line::default());
    lines.push(Line::from(said_line(app)));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Welcome ");

    let start = Paragraph::new(Text::from(lines))
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(start, area);
}

/// Active controls: the conversation transcript, the latest-utterance
/// line, and the typed fallback input.
fn render_session(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, said_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(3),
    ])
    .areas(area);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let inner_width = chat_area.width.saturating_sub(2);
    let inner_height = chat_area.height.saturating_sub(2);

    let lines = transcript_lines(app.conversation.messages());
    let scroll = scroll_to_bottom(&lines, inner_width, inner_height);

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((scroll, 0));

    frame.render_widget(chat, chat_area);

    let said = Paragraph::new(Line::from(said_line(app)));
    frame.render_widget(said, said_area);

    render_input(app, frame, input_area);
}

fn said_line(app: &App) -> Vec<Span<'static>> {
    if app.capturing {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        return vec![Span::styled(
            format!(" Listening{dots}"),
            Style::default().fg(Color::Green).add_modifier(Modifier::ITALIC),
        )];
    }
    if !app.latest_transcript.is_empty() {
        return vec![
            Span::styled(" You said: ", Style::default().fg(Color::DarkGray)),
            Span::raw(app.latest_transcript.clone()),
        ];
    }
    match &app.status {
        Some(status) => vec![Span::styled(
            format!(" {status}"),
            Style::default().fg(Color::DarkGray),
        )],
        None => vec![Span::raw("")],
    }
}

fn render_input(app: &App, frame: &mut Frame, input_area: Rect) {
    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Type your order (i) ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.typed_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = app
        .typed_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, input_area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if !app.session_active {
        vec![
            Span::styled(" s ", key_style),
            Span::styled(" start session ", label_style),
            Span::styled(" v ", key_style),
            Span::styled(" capture ", label_style),
            Span::styled(" p ", key_style),
            Span::styled(" process ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]
    } else if app.input_mode == InputMode::Editing {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ]
    } else {
        vec![
            Span::styled(" v ", key_style),
            Span::styled(" speak ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" f ", key_style),
            Span::styled(" finalize ", label_style),
            Span::styled(" r ", key_style),
            Span::styled(" restart ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]
    };

    let footer = Paragraph::new(Line::from(hints));
    frame.render_widget(footer, area);
}
