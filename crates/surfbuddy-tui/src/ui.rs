use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use surfbuddy_core::{ChatMessage, ChatRole, ConnectionState, ModelStatus, SaveStatus};

use crate::app::{App, InputField, Screen, SettingsFocus, SAVE_OK};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
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

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Home => render_home_screen(app, frame, body_area),
        Screen::Settings => render_settings_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let model_indicator = match app.chat.config() {
        Some(config) => format!(" [{}]", config.selected_model),
        None => " [not configured]".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" SurfBuddy ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(model_indicator, Style::default().fg(Color::Black)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Black),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let editing = match app.screen {
        Screen::Home => false,
        Screen::Settings => app.settings_focus == SettingsFocus::Url,
        Screen::Chat => true,
    };
    let mode_style = if editing {
        Style::default().bg(Color::Yellow).fg(Color::Black)
    } else {
        Style::default().bg(Color::Blue).fg(Color::White)
    };

    let mode_text = match app.screen {
        Screen::Home => " HOME ",
        Screen::Settings => " SETTINGS ",
        Screen::Chat => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (app.screen, app.settings_focus) {
        (Screen::Home, _) => vec![
            Span::styled(" c ", key_style),
            Span::styled(" configure ", label_style),
            Span::styled(" a ", key_style),
            Span::styled(" chat ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Settings, focus) => {
            let mut hints = vec![
                Span::styled(" Tab ", key_style),
                Span::styled(" focus ", label_style),
            ];
            if focus == SettingsFocus::Model {
                hints.extend(vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" model ", label_style),
                    Span::styled(" r ", key_style),
                    Span::styled(" refresh ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" ^S ", key_style),
                Span::styled(" save ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" back ", label_style),
            ]);
            hints
        }
        (Screen::Chat, _) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" ↑/↓ ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" back ", label_style),
        ],
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_home_screen(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" SurfBuddy ");

    let mut lines = vec![
        Line::default(),
        Line::from(Span::styled(
            "Chat with a local Ollama model.",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::default(),
    ];

    match app.chat.config() {
        Some(config) => {
            lines.push(Line::from(vec![
                Span::styled("Server: ", Style::default().fg(Color::DarkGray)),
                Span::raw(config.server_url.clone()),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Model:  ", Style::default().fg(Color::DarkGray)),
                Span::styled(config.selected_model.clone(), Style::default().fg(Color::Green)),
            ]));
        }
        None => {
            lines.push(Line::from(Span::styled(
                "No Ollama configuration saved yet.",
                Style::default().fg(Color::Yellow),
            )));
        }
    }

    lines.push(Line::default());
    lines.push(Line::from(vec![
        Span::raw("Press "),
        Span::styled("c", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" to Configure Ollama, "),
        Span::styled("a", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" to open the AI Assistant."),
    ]));

    let home = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(home, area);
}

fn render_settings_screen(app: &App, frame: &mut Frame, area: Rect) {
    let [url_area, status_area, models_area, save_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(area);

    let url_focused = app.settings_focus == SettingsFocus::Url;
    render_input(
        frame,
        url_area,
        &app.url_input,
        " Ollama Server URL ",
        url_focused,
    );

    render_connection_status(app, frame, status_area);
    render_model_list(app, frame, models_area);
    render_save_line(app, frame, save_area);
}

fn render_connection_status(app: &App, frame: &mut Frame, area: Rect) {
    let status = match app.controller.state() {
        ConnectionState::Idle => Line::default(),
        ConnectionState::Connecting => {
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            Line::from(Span::styled(
                format!(" Connecting to Ollama server{}", dots),
                Style::default().fg(Color::Yellow),
            ))
        }
        ConnectionState::Connected(_) => Line::from(Span::styled(
            " Connected to Ollama server",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        ConnectionState::Failed(reason) => Line::from(Span::styled(
            format!(" {}", reason),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
    };

    frame.render_widget(Paragraph::new(status), area);
}

fn render_model_list(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.settings_focus == SettingsFocus::Model;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Model (r to refresh) ");

    let placeholder = match app.controller.state() {
        ConnectionState::Connecting | ConnectionState::Connected(ModelStatus::Loading) => {
            Some("Loading models...")
        }
        ConnectionState::Connected(ModelStatus::Empty) => Some("No models available"),
        ConnectionState::Idle | ConnectionState::Failed(_) => Some("Not connected"),
        ConnectionState::Connected(ModelStatus::Ready(_)) => None,
    };

    if let Some(text) = placeholder {
        let paragraph = Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray)))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let models = app.controller.models();
    let selected = app.controller.selected_model();
    let items: Vec<ListItem> = models
        .iter()
        .map(|model| {
            let style = if model.name == selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mut spans = vec![Span::styled(format!(" {} ", model.name), style)];
            if let Some(size) = model.size_label() {
                spans.push(Span::styled(size, Style::default().fg(Color::DarkGray)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let mut state = ListState::default();
    if app.controller.is_selection_valid() {
        state.select(models.iter().position(|m| m.name == selected));
    }

    let highlight = if focused {
        Style::default()
            .bg(Color::Blue)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };

    let list = List::new(items)
        .block(block)
        .highlight_style(highlight)
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_save_line(app: &App, frame: &mut Frame, area: Rect) {
    let line = if let Some(notice) = app.notice {
        let color = match app.controller.save_status() {
            SaveStatus::Success => Color::Green,
            SaveStatus::Error => Color::Red,
            SaveStatus::Neutral if notice == SAVE_OK => Color::Green,
            SaveStatus::Neutral => Color::Red,
        };
        Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
    } else if app.controller.can_save() {
        Line::from(vec![
            Span::styled(" Ctrl+S ", Style::default().bg(Color::Green).fg(Color::Black)),
            Span::raw(" Save Settings"),
        ])
    } else {
        Line::from(Span::styled(
            " Save Settings",
            Style::default().fg(Color::DarkGray),
        ))
    };

    frame.render_widget(Paragraph::new(line), area);
}

/// Role label followed by one line per line of content.
fn message_lines(msg: &ChatMessage) -> Vec<Line<'_>> {
    let (label, label_color) = match msg.role {
        ChatRole::User => ("You:", Color::Cyan),
        ChatRole::Assistant => ("AI:", Color::Yellow),
        ChatRole::System => ("System:", Color::Magenta),
    };
    let mut lines = vec![Line::from(Span::styled(
        label,
        Style::default().fg(label_color).add_modifier(Modifier::BOLD),
    ))];

    for line in msg.content.lines() {
        lines.push(match msg.role {
            ChatRole::User => Line::from(line),
            ChatRole::Assistant => parse_markdown_line(line),
            ChatRole::System => Line::from(Span::styled(
                line,
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )),
        });
    }
    lines
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let title = match app.chat.config() {
        Some(config) => format!(" AI Assistant: {} ", config.selected_model),
        None => " AI Assistant ".to_string(),
    };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.chat.messages() {
        lines.extend(message_lines(msg));
        lines.push(Line::default());
    }

    if app.chat.is_loading() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let title = if app.chat.config().is_none() {
        " Configure Ollama first (Esc, then c) "
    } else if app.chat.is_loading() {
        " Waiting for reply... "
    } else {
        " Ask a question "
    };
    render_input(frame, input_area, &app.chat_input, title, app.chat.can_send());
}

/// Bordered single-line input with horizontal scrolling that keeps the cursor visible.
fn render_input(frame: &mut Frame, area: Rect, input: &InputField, title: &str, focused: bool) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if input.cursor >= inner_width {
        input.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = input
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(paragraph, area);

    if focused {
        let cursor_x = (input.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}
