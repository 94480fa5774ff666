use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use super::{App, InputMode};
use crate::nav::{NoticeLevel, Screen};
use crate::tui_shell::{modal, view};

pub(super) fn draw(frame: &mut ratatui::Frame, app: &App) {
    let nav = app.nav();
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(0),
            Constraint::Length(2),
            Constraint::Length(if app.suggestions.is_empty() { 0 } else { 8 }),
            Constraint::Length(2),
        ])
        .split(area);

    // Header
    let session_color = if nav.session().is_some() {
        Color::Green
    } else {
        Color::Red
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled("stratus", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw("  "),
        Span::styled(nav.status_line(), Style::default().fg(session_color)),
        Span::raw("  "),
        Span::styled(
            format!("depth {}", nav.frames().len()),
            Style::default().fg(Color::Gray),
        ),
    ]))
    .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    // The topmost non-dialog screen stays visible under a dialog.
    let base = nav.frames().iter().rev().find(|f| !f.screen.is_dialog());
    if let Some(f) = base {
        view::render_screen(frame, chunks[1], nav, &f.screen);
    }

    // Notice
    let notice = nav
        .frames()
        .iter()
        .rev()
        .find_map(|f| f.notice.as_ref());
    let notice_line = match notice {
        Some(n) => {
            let color = match n.level {
                NoticeLevel::Info => Color::White,
                NoticeLevel::Success => Color::Green,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(n.text.as_str(), Style::default().fg(color)))
        }
        None => Line::from(""),
    };
    frame.render_widget(
        Paragraph::new(notice_line)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::TOP)),
        chunks[2],
    );

    // Suggestions
    if !app.suggestions.is_empty() {
        let sel = app.suggestion_selected.min(app.suggestions.len() - 1);
        let max_items = chunks[3].height.saturating_sub(1).max(1) as usize;
        let start = (sel + 1).saturating_sub(max_items);
        let lines: Vec<Line> = app
            .suggestions
            .iter()
            .enumerate()
            .skip(start)
            .take(max_items)
            .map(|(i, s)| {
                let style = if i == sel {
                    Style::default().bg(Color::DarkGray)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{: <18}", s.name), style.fg(Color::Yellow)),
                    Span::styled(s.help.as_str(), style.fg(Color::White)),
                ])
            })
            .collect();
        frame.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::TOP)),
            chunks[3],
        );
    }

    // Input / hints
    let input_line = match app.mode {
        InputMode::Normal => Line::from(Span::styled(
            ": command  / filter  ? help  Esc back  q quit",
            Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        )),
        InputMode::Palette | InputMode::Filter => Line::from(vec![
            Span::styled(app.prompt(), Style::default().fg(Color::Cyan)),
            Span::raw(app.input.text()),
        ]),
    };
    frame.render_widget(
        Paragraph::new(input_line).block(Block::default().borders(Borders::TOP)),
        chunks[4],
    );

    if let Some(Screen::Dialog(d)) = nav.top().map(|f| &f.screen) {
        dim_frame(frame);
        modal::draw_dialog(frame, d);
        return;
    }

    if app.mode != InputMode::Normal {
        let x = chunks[4].x + app.prompt().len() as u16 + app.input.cursor as u16;
        frame.set_cursor_position((x, chunks[4].y + 1));
    }
}

fn dim_frame(frame: &mut ratatui::Frame) {
    let area = frame.area();
    let buf = frame.buffer_mut();
    for y in area.y..area.y.saturating_add(area.height) {
        for x in area.x..area.x.saturating_add(area.width) {
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.modifier |= Modifier::DIM;
            }
        }
    }
}
