use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::nav::{Dialog, Navigator};

pub(super) fn draw_dialog(frame: &mut ratatui::Frame, dialog: &Dialog) {
    let area = frame.area();
    let w = area.width.saturating_sub(6).clamp(20, 80);
    let h = area.height.saturating_sub(6).clamp(8, 14);
    let box_area = Rect {
        x: area.x + (area.width.saturating_sub(w)) / 2,
        y: area.y + (area.height.saturating_sub(h)) / 2,
        width: w,
        height: h,
    };

    frame.render_widget(Clear, box_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(dialog.kind.title());
    frame.render_widget(block.clone(), box_area);
    let inner = block.inner(box_area);

    let mut lines: Vec<Line> = dialog.lines.iter().map(|s| Line::from(s.as_str())).collect();
    if let Some(err) = &dialog.error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            err.as_str(),
            Style::default().fg(Color::Red),
        )));
    }

    if !dialog.kind.has_input() {
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
        return;
    }

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(inner);
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), parts[0]);
    let shown = if dialog.kind.masks_input() {
        "*".repeat(dialog.input.text().chars().count())
    } else {
        dialog.input.text().to_string()
    };
    frame.render_widget(
        Paragraph::new(shown)
            .block(Block::default().borders(Borders::ALL).title("Enter: ok  Esc: cancel")),
        parts[1],
    );
    let x = dialog.input.cursor as u16;
    frame.set_cursor_position((parts[1].x + 1 + x, parts[1].y + 1));
}

pub(super) fn handle_dialog_key(nav: &mut Navigator, key: KeyEvent) {
    let has_input = nav
        .top_dialog_mut()
        .is_some_and(|d| d.kind.has_input());

    if !has_input {
        match key.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => nav.submit_dialog(),
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                nav.pop();
            }
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Enter => nav.submit_dialog(),
        KeyCode::Esc => {
            nav.pop();
        }
        code => {
            let Some(d) = nav.top_dialog_mut() else {
                return;
            };
            d.error = None;
            match code {
                KeyCode::Left => d.input.move_left(),
                KeyCode::Right => d.input.move_right(),
                KeyCode::Backspace => d.input.backspace(),
                KeyCode::Delete => d.input.delete(),
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    d.input.clear()
                }
                KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    d.input.insert_char(c)
                }
                _ => {}
            }
        }
    }
}
