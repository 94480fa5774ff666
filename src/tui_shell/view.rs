use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::cache::EntryState;
use crate::model::ResourceRecord;
use crate::nav::{
    DescribeScreen, ListScreen, Navigator, PickerScreen, RelatedScreen, Screen, has_public_key,
};
use crate::registry::ResourceTypeDescriptor;

pub(super) fn render_view_chrome(
    frame: &mut ratatui::Frame,
    title: &str,
    status: Span<'_>,
    area: Rect,
) -> Rect {
    let header = Line::from(vec![
        Span::styled(title.to_string(), Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        status,
    ]);
    let outer = Block::default().borders(Borders::ALL).title(header);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);
    inner
}

pub(super) fn render_screen(frame: &mut ratatui::Frame, area: Rect, nav: &Navigator, screen: &Screen) {
    match screen {
        Screen::Resources(l) => render_list(frame, area, nav, l),
        Screen::Related(r) => render_related(frame, area, r),
        Screen::Describe(d) => render_describe(frame, area, d),
        Screen::Contexts(p) => {
            let active = nav.session().map(|s| s.context_name().to_string());
            let chrome = PickerChrome {
                title: "Contexts",
                hint: "Enter: select  D: default  x: delete  a: add",
                empty: "(none; `add`, `import env` or `import <file>`)",
            };
            let default = nav.sessions().defaults().context.as_deref();
            render_picker(frame, area, &chrome, p, active.as_deref(), default, |_| String::new());
        }
        Screen::Regions(p) => {
            let active = nav.session().map(|s| s.region().to_string());
            let chrome = PickerChrome {
                title: "Regions",
                hint: "Enter: select  D: default",
                empty: "(no regions configured)",
            };
            let default = nav.sessions().defaults().region.as_deref();
            render_picker(frame, area, &chrome, p, active.as_deref(), default, |_| String::new());
        }
        Screen::Keys(p) => {
            let chrome = PickerChrome {
                title: "SSH keys",
                hint: "Enter: use  D: default  e: login name",
                empty: "(no private keys found)",
            };
            let defaults = nav.sessions().defaults();
            render_picker(frame, area, &chrome, p, nav.ssh_key(), defaults.ssh_key.as_deref(), |key| {
                let public = nav
                    .ssh_dir()
                    .is_some_and(|dir| has_public_key(dir, key));
                let user = defaults.ssh_usernames.get(key).map(String::as_str).unwrap_or("-");
                format!("  user {}{}", user, if public { "" } else { "  (no .pub)" })
            });
        }
        Screen::Help { lines, scroll } => {
            let inner = render_view_chrome(frame, "Help", Span::raw(""), area);
            render_text(frame, inner, lines, *scroll);
        }
        Screen::Dialog(_) => {}
    }
}

fn state_span(state: EntryState) -> Span<'static> {
    let (label, color) = match state {
        EntryState::Empty => ("empty", Color::Gray),
        EntryState::Refreshing => ("refreshing", Color::Cyan),
        EntryState::Fresh => ("fresh", Color::Green),
        EntryState::Stale => ("stale", Color::Yellow),
        EntryState::Errored => ("errored", Color::Red),
    };
    Span::styled(label, Style::default().fg(color))
}

fn render_list(frame: &mut ratatui::Frame, area: Rect, nav: &Navigator, list: &ListScreen) {
    let Some(desc) = nav.registry().get(list.kind) else {
        return;
    };
    let view = nav.list_view(list);
    let status = view
        .snapshot
        .as_ref()
        .map(|s| state_span(s.state))
        .unwrap_or_else(|| state_span(EntryState::Empty));
    let mut title = desc.canonical.to_string();
    if !list.filter.is_empty() {
        title.push_str(&format!(" filter={}", list.filter));
    }
    let inner = render_view_chrome(frame, &title, status, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            header_row(desc),
            Style::default().add_modifier(Modifier::BOLD),
        ))),
        parts[0],
    );

    let mut rows: Vec<ListItem> = view
        .records
        .iter()
        .map(|r| ListItem::new(record_row(desc, r)))
        .collect();
    let loading = view.snapshot.as_ref().is_none_or(|s| !s.has_data());
    if rows.is_empty() {
        rows.push(ListItem::new(if loading { "(loading)" } else { "(none)" }));
    }
    let mut state = ListState::default();
    if !view.records.is_empty() {
        state.select(Some(list.selected.min(view.records.len() - 1)));
    }
    let widget = List::new(rows).highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(widget, parts[1], &mut state);

    let footer = match &list.warning {
        Some(w) => Span::styled(format!("last refresh failed: {}", w), Style::default().fg(Color::Red)),
        None => Span::styled(action_hints(desc), Style::default().fg(Color::Gray)),
    };
    frame.render_widget(Paragraph::new(Line::from(footer)), parts[2]);
}

fn pad(s: &str, width: u16) -> String {
    let w = width as usize;
    let mut out: String = s.chars().take(w).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat_n(' ', w - len + 1));
    out
}

fn header_row(desc: &ResourceTypeDescriptor) -> String {
    let mut out = pad("ID", 22);
    for c in desc.columns {
        out.push_str(&pad(&c.name.to_uppercase(), c.width));
    }
    out
}

fn record_row(desc: &ResourceTypeDescriptor, rec: &ResourceRecord) -> String {
    let mut out = pad(&rec.id, 22);
    for c in desc.columns {
        out.push_str(&pad(&rec.attr_text(c.name), c.width));
    }
    out
}

fn action_hints(desc: &ResourceTypeDescriptor) -> String {
    let mut parts: Vec<String> = desc
        .actions
        .iter()
        .map(|a| format!("{}:{}", a.hotkey, a.label))
        .collect();
    parts.push("d:describe".into());
    if !desc.relations.is_empty() {
        parts.push("Enter:related".into());
    }
    parts.join("  ")
}

fn render_related(frame: &mut ratatui::Frame, area: Rect, screen: &RelatedScreen) {
    let title = format!("Related to {}", screen.id);
    let inner = render_view_chrome(frame, &title, Span::raw(""), area);
    let Some(groups) = &screen.groups else {
        frame.render_widget(Paragraph::new("(resolving)"), inner);
        return;
    };

    let mut items = Vec::new();
    let mut selectable = Vec::new();
    for g in groups {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("{} ({})", g.label, g.records.len() + g.missing.len()),
            Style::default().fg(Color::Yellow),
        ))));
        selectable.push(false);
        for r in &g.records {
            let name = r.attr_text("name");
            items.push(ListItem::new(format!("  {} {}", r.id, name)));
            selectable.push(true);
        }
        for m in &g.missing {
            items.push(
                ListItem::new(format!("  {} (not found)", m)).style(Style::default().fg(Color::Gray)),
            );
            selectable.push(true);
        }
    }
    if items.is_empty() {
        items.push(ListItem::new("(no related resources)"));
    }
    // Map the row index over selectable rows to a list index.
    let mut state = ListState::default();
    state.select(
        selectable
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| i)
            .nth(screen.selected),
    );
    let widget = List::new(items).highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(widget, inner, &mut state);
}

fn render_describe(frame: &mut ratatui::Frame, area: Rect, screen: &DescribeScreen) {
    let title = format!("{} {}", screen.kind, screen.id);
    let inner = render_view_chrome(frame, &title, Span::raw(""), area);
    match &screen.lines {
        Some(lines) => render_text(frame, inner, lines, screen.scroll),
        None => frame.render_widget(Paragraph::new("(loading)"), inner),
    }
}

fn render_text(frame: &mut ratatui::Frame, area: Rect, lines: &[String], scroll: usize) {
    let text: Vec<Line> = lines.iter().map(|s| Line::from(s.as_str())).collect();
    let scroll = scroll.min(lines.len().saturating_sub(1)) as u16;
    frame.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0)),
        area,
    );
}

struct PickerChrome {
    title: &'static str,
    hint: &'static str,
    empty: &'static str,
}

fn render_picker(
    frame: &mut ratatui::Frame,
    area: Rect,
    chrome: &PickerChrome,
    picker: &PickerScreen,
    active: Option<&str>,
    default: Option<&str>,
    detail: impl Fn(&str) -> String,
) {
    let inner = render_view_chrome(
        frame,
        chrome.title,
        Span::styled(chrome.hint, Style::default().fg(Color::Gray)),
        area,
    );
    let mut items: Vec<ListItem> = picker
        .items
        .iter()
        .map(|name| {
            let marker = if Some(name.as_str()) == active { "*" } else { " " };
            let suffix = if Some(name.as_str()) == default { " (default)" } else { "" };
            ListItem::new(format!("{} {}{}{}", marker, name, suffix, detail(name)))
        })
        .collect();
    if items.is_empty() {
        items.push(ListItem::new(chrome.empty));
    }
    let mut state = ListState::default();
    if !picker.items.is_empty() {
        state.select(Some(picker.selected.min(picker.items.len() - 1)));
    }
    let widget = List::new(items).highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(widget, inner, &mut state);
}
