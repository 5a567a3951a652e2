use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use tui_input::{Input, InputRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

impl MessageKind {
    fn color(self) -> Color {
        match self {
            MessageKind::Info => Color::Cyan,
            MessageKind::Warning => Color::Yellow,
            MessageKind::Error => Color::Red,
        }
    }
}

/// Modal popup drawn over the main window. While one is open it receives
/// every key press.
#[derive(Debug, Clone)]
pub enum Dialog {
    Message {
        kind: MessageKind,
        title: String,
        body: String,
    },
    ConfirmDelete {
        index: usize,
        name: String,
    },
    AddStation(AddStationForm),
}

impl Dialog {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::message(MessageKind::Info, title, body)
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::message(MessageKind::Warning, title, body)
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::message(MessageKind::Error, title, body)
    }

    fn message(kind: MessageKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Dialog::Message {
            kind,
            title: title.into(),
            body: body.into(),
        }
    }
}

pub const FIELD_LABELS: [&str; 3] = ["Name", "URL", "Frequency"];

#[derive(Debug, Clone)]
pub struct AddStationForm {
    pub fields: [Input; 3],
    pub focus: usize,
    pub error: Option<String>,
}

impl Default for AddStationForm {
    fn default() -> Self {
        Self {
            fields: [
                Input::default(),
                Input::new("https://".to_string()),
                Input::new("98.5".to_string()),
            ],
            focus: 0,
            error: None,
        }
    }
}

impl AddStationForm {
    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len();
    }

    pub fn previous_field(&mut self) {
        self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }

    pub fn edit(&mut self, request: InputRequest) {
        self.fields[self.focus].handle(request);
    }

    pub fn name(&self) -> &str {
        self.fields[0].value()
    }

    pub fn url(&self) -> &str {
        self.fields[1].value()
    }

    pub fn frequency(&self) -> &str {
        self.fields[2].value()
    }
}

/// Line-editing keys shared by the search box and the form fields.
pub fn input_request(key: &KeyEvent) -> Option<InputRequest> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('u') if ctrl => Some(InputRequest::DeleteLine),
        KeyCode::Char('w') if ctrl => Some(InputRequest::DeletePrevWord),
        KeyCode::Char('a') if ctrl => Some(InputRequest::GoToStart),
        KeyCode::Char('e') if ctrl => Some(InputRequest::GoToEnd),
        KeyCode::Char(_) if ctrl => None,
        KeyCode::Char(c) => Some(InputRequest::InsertChar(c)),
        KeyCode::Backspace => Some(InputRequest::DeletePrevChar),
        KeyCode::Delete => Some(InputRequest::DeleteNextChar),
        KeyCode::Left => Some(InputRequest::GoToPrevChar),
        KeyCode::Right => Some(InputRequest::GoToNextChar),
        KeyCode::Home => Some(InputRequest::GoToStart),
        KeyCode::End => Some(InputRequest::GoToEnd),
        _ => None,
    }
}

pub fn render_dialog(f: &mut Frame, dialog: &Dialog) {
    match dialog {
        Dialog::Message { kind, title, body } => render_message(f, *kind, title, body),
        Dialog::ConfirmDelete { name, .. } => render_confirm(f, name),
        Dialog::AddStation(form) => render_add_station(f, form),
    }
}

fn popup_block(title: &str, color: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(color))
}

fn render_message(f: &mut Frame, kind: MessageKind, title: &str, body: &str) {
    let mut lines: Vec<Line> = body.lines().map(Line::from).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "[Enter] OK",
        Style::default().fg(Color::DarkGray),
    )));

    let height = (lines.len() as u16 + 2).max(5);
    let area = centered_rect(f.area(), 56, height);
    let paragraph = Paragraph::new(lines)
        .block(popup_block(title, kind.color()))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn render_confirm(f: &mut Frame, name: &str) {
    let lines = vec![
        Line::from(format!("Remove \"{}\" from the list?", name)),
        Line::from(""),
        Line::from(Span::styled(
            "[y] Remove   [n] Cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let area = centered_rect(f.area(), 56, 6);
    let paragraph = Paragraph::new(lines)
        .block(popup_block("Remove station", Color::Yellow))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn render_add_station(f: &mut Frame, form: &AddStationForm) {
    let area = centered_rect(f.area(), 60, 13);
    f.render_widget(Clear, area);
    f.render_widget(popup_block("Add station", Color::Cyan), area);

    let inner = area.inner(ratatui::layout::Margin {
        horizontal: 1,
        vertical: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(2),
        ])
        .split(inner);

    for (i, (input, label)) in form.fields.iter().zip(FIELD_LABELS).enumerate() {
        let focused = i == form.focus;
        let border = if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let width = rows[i].width.saturating_sub(2) as usize;
        let scroll = input.visual_scroll(width.saturating_sub(1));
        let field = Paragraph::new(input.value())
            .scroll((0, scroll as u16))
            .block(Block::default().borders(Borders::ALL).title(label).border_style(border));
        f.render_widget(field, rows[i]);

        if focused {
            let x = rows[i].x + 1 + (input.visual_cursor().saturating_sub(scroll)) as u16;
            f.set_cursor_position(Position::new(x, rows[i].y + 1));
        }
    }

    let footer = match &form.error {
        Some(error) => Line::from(Span::styled(error.as_str(), Style::default().fg(Color::Yellow))),
        None => Line::from(Span::styled(
            "[Tab] Next field   [Enter] Add   [Esc] Cancel",
            Style::default().fg(Color::DarkGray),
        )),
    };
    f.render_widget(Paragraph::new(footer).alignment(Alignment::Center), rows[3]);
}

/// Rectangle of at most `width` x `height` centered in `area`.
pub fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
