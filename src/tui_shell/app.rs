use crate::nav::{Input, Navigator, Screen, Suggestion};
use crate::tui::Runtime;

mod event_loop;
mod render;
mod runtime;

pub(super) use runtime::run;

/// What the bottom line is editing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum InputMode {
    Normal,
    Palette,
    Filter,
}

pub(super) struct App {
    rt: Runtime,
    pub(super) mode: InputMode,
    pub(super) input: Input,
    pub(super) suggestions: Vec<Suggestion>,
    pub(super) suggestion_selected: usize,
}

impl App {
    pub(super) fn new(rt: Runtime) -> Self {
        Self {
            rt,
            mode: InputMode::Normal,
            input: Input::default(),
            suggestions: Vec::new(),
            suggestion_selected: 0,
        }
    }

    pub(super) fn nav(&self) -> &Navigator {
        &self.rt.navigator
    }

    pub(super) fn nav_mut(&mut self) -> &mut Navigator {
        &mut self.rt.navigator
    }

    pub(super) fn open_palette(&mut self) {
        self.mode = InputMode::Palette;
        self.input.clear();
        self.recompute_suggestions();
    }

    /// Filter editing starts from the list's current filter.
    pub(super) fn open_filter(&mut self) {
        let current = match self.nav().top().map(|f| &f.screen) {
            Some(Screen::Resources(l)) => l.filter.clone(),
            _ => return,
        };
        self.mode = InputMode::Filter;
        self.input.set(current);
    }

    pub(super) fn close_input(&mut self) {
        self.mode = InputMode::Normal;
        self.input.clear();
        self.suggestions.clear();
        self.suggestion_selected = 0;
    }

    pub(super) fn recompute_suggestions(&mut self) {
        if self.mode != InputMode::Palette {
            self.suggestions.clear();
            return;
        }
        self.suggestions = self.nav().suggestions(self.input.text());
        if self.suggestion_selected >= self.suggestions.len() {
            self.suggestion_selected = 0;
        }
    }

    pub(super) fn apply_selected_suggestion(&mut self) {
        let Some(s) = self.suggestions.get(self.suggestion_selected) else {
            return;
        };
        let line = format!("{} ", s.name);
        self.input.set(line);
        self.recompute_suggestions();
    }

    /// Dispatch the palette line and leave palette mode.
    pub(super) fn run_palette_line(&mut self) {
        let line = self.input.text().trim().to_string();
        self.input.push_history(&line);
        self.close_input();
        self.nav_mut().dispatch(&line);
    }

    pub(super) fn sync_filter(&mut self) {
        let text = self.input.text().to_string();
        self.nav_mut().set_filter(&text);
    }

    pub(super) fn prompt(&self) -> &'static str {
        match self.mode {
            InputMode::Normal => "",
            InputMode::Palette => ":",
            InputMode::Filter => "/",
        }
    }
}
