use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use super::{App, InputMode};
use crate::nav::Screen;
use crate::tui_shell::modal;

pub(super) fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.nav_mut().pump();
        app.nav_mut().tick();

        terminal
            .draw(|f| super::render::draw(f, app))
            .context("draw")?;
        if app.nav().should_quit() {
            return Ok(());
        }

        if event::poll(Duration::from_millis(50)).context("poll")? {
            match event::read().context("read event")? {
                Event::Key(k) if k.kind == KeyEventKind::Press => handle_key(app, k),
                _ => {}
            }
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.nav_mut().request_quit();
        return;
    }

    if matches!(app.nav().top().map(|f| &f.screen), Some(Screen::Dialog(_))) {
        modal::handle_dialog_key(app.nav_mut(), key);
        return;
    }

    match app.mode {
        InputMode::Palette => handle_palette_key(app, key),
        InputMode::Filter => handle_filter_key(app, key),
        InputMode::Normal => handle_screen_key(app, key),
    }
}

fn handle_palette_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_input(),
        KeyCode::Tab => app.apply_selected_suggestion(),
        KeyCode::Enter => {
            if let Some(s) = app.suggestions.get(app.suggestion_selected) {
                let first = app.input.text().split_whitespace().next().unwrap_or("");
                let exact = s.name == first || s.aliases.iter().any(|a| a == first);
                if !exact {
                    app.apply_selected_suggestion();
                }
            }
            app.run_palette_line();
        }
        KeyCode::Up => {
            if !app.suggestions.is_empty() {
                let n = app.suggestions.len();
                app.suggestion_selected = (app.suggestion_selected + n - 1) % n;
                return;
            }
            app.input.history_up();
            app.recompute_suggestions();
        }
        KeyCode::Down => {
            if !app.suggestions.is_empty() {
                let n = app.suggestions.len();
                app.suggestion_selected = (app.suggestion_selected + 1) % n;
                return;
            }
            app.input.history_down();
            app.recompute_suggestions();
        }
        KeyCode::Left => app.input.move_left(),
        KeyCode::Right => app.input.move_right(),
        KeyCode::Backspace => {
            if app.input.is_empty() {
                app.close_input();
                return;
            }
            app.input.backspace();
            app.recompute_suggestions();
        }
        KeyCode::Delete => {
            app.input.delete();
            app.recompute_suggestions();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.clear();
            app.recompute_suggestions();
        }
        KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.history_up();
            app.recompute_suggestions();
        }
        KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.history_down();
            app.recompute_suggestions();
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.insert_char(c);
            app.recompute_suggestions();
        }
        _ => {}
    }
}

fn handle_filter_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input.clear();
            app.sync_filter();
            app.close_input();
        }
        KeyCode::Enter => app.close_input(),
        KeyCode::Left => app.input.move_left(),
        KeyCode::Right => app.input.move_right(),
        KeyCode::Backspace => {
            app.input.backspace();
            app.sync_filter();
        }
        KeyCode::Delete => {
            app.input.delete();
            app.sync_filter();
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input.insert_char(c);
            app.sync_filter();
        }
        _ => {}
    }
}

fn handle_screen_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char(':') => return app.open_palette(),
        KeyCode::Char('/') => return app.open_filter(),
        _ => {}
    }
    let top = app.nav().top().map(|f| &f.screen);
    let on_picker = top.is_some_and(|s| s.picker().is_some());
    let on_contexts = matches!(top, Some(Screen::Contexts(_)));
    let on_keys = matches!(top, Some(Screen::Keys(_)));
    let nav = app.nav_mut();
    match key.code {
        KeyCode::Esc => {
            nav.clear_notice();
            if !nav.pop() {
                nav.set_filter("");
            }
        }
        KeyCode::Up | KeyCode::Char('k') => nav.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => nav.move_selection(1),
        KeyCode::PageUp => nav.move_selection(-10),
        KeyCode::PageDown => nav.move_selection(10),
        KeyCode::Home | KeyCode::Char('g') => nav.move_selection(isize::MIN / 2),
        KeyCode::End | KeyCode::Char('G') => nav.move_selection(isize::MAX / 2),
        KeyCode::Enter => nav.activate_selected(),
        KeyCode::Char('?') => nav.dispatch("help"),
        KeyCode::Char('q') => nav.request_quit(),
        KeyCode::Char('d') => nav.open_describe(),
        KeyCode::Char('r') => nav.refresh_current(),
        KeyCode::Char('D') if on_picker => nav.set_default_selected(),
        KeyCode::Char('x') if on_contexts => nav.delete_selected(),
        KeyCode::Char('a') if on_contexts => nav.open_add_context(),
        KeyCode::Char('e') if on_keys => nav.edit_key_username(),
        KeyCode::Char(c) => {
            nav.action_hotkey(c);
        }
        _ => {}
    }
}
