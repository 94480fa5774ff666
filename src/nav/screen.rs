use std::time::{Duration, Instant};

use crate::cache::{CacheKey, RelatedGroup};
use crate::model::KindId;

use super::dialog::Dialog;

/// Stable identity of one stack frame, used to route late results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

/// A list of one resource kind, bound to one cache entry.
#[derive(Clone, Debug)]
pub struct ListScreen {
    pub kind: KindId,
    pub key: CacheKey,
    pub selected: usize,
    pub filter: String,
    /// Last entry version delivered to this screen.
    pub seen_version: u64,
    /// Set while the entry's last refresh failed.
    pub warning: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RelatedScreen {
    pub kind: KindId,
    pub id: String,
    /// None until resolved.
    pub groups: Option<Vec<RelatedGroup>>,
    pub selected: usize,
}

impl RelatedScreen {
    /// Flattened (target kind, record id) rows in display order.
    pub fn rows(&self) -> Vec<(KindId, String)> {
        self.groups
            .iter()
            .flatten()
            .flat_map(|g| {
                g.records
                    .iter()
                    .map(move |r| (g.target, r.id.clone()))
                    .chain(g.missing.iter().map(move |m| (g.target, m.clone())))
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct DescribeScreen {
    pub kind: KindId,
    pub id: String,
    /// None while the describe call runs.
    pub lines: Option<Vec<String>>,
    pub scroll: usize,
}

/// A pick list of names (contexts, regions or SSH keys).
#[derive(Clone, Debug)]
pub struct PickerScreen {
    pub items: Vec<String>,
    pub selected: usize,
}

#[derive(Clone, Debug)]
pub enum Screen {
    Resources(ListScreen),
    Related(RelatedScreen),
    Describe(DescribeScreen),
    Contexts(PickerScreen),
    Regions(PickerScreen),
    Keys(PickerScreen),
    Help { lines: Vec<String>, scroll: usize },
    Dialog(Dialog),
}

impl Screen {
    pub fn is_dialog(&self) -> bool {
        matches!(self, Screen::Dialog(_))
    }

    pub fn picker(&self) -> Option<&PickerScreen> {
        match self {
            Screen::Contexts(p) | Screen::Regions(p) | Screen::Keys(p) => Some(p),
            _ => None,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Screen::Resources(l) => l.kind.to_string(),
            Screen::Related(r) => format!("related: {}", r.id),
            Screen::Describe(d) => format!("{} {}", d.kind, d.id),
            Screen::Contexts(_) => "contexts".to_string(),
            Screen::Regions(_) => "regions".to_string(),
            Screen::Keys(_) => "ssh keys".to_string(),
            Screen::Help { .. } => "help".to_string(),
            Screen::Dialog(d) => d.kind.title(),
        }
    }

    pub fn cache_key(&self) -> Option<&CacheKey> {
        match self {
            Screen::Resources(l) => Some(&l.key),
            _ => None,
        }
    }
}

/// Periodic freshness check owned by a visible list screen. Dropped with
/// its frame.
#[derive(Clone, Debug)]
pub struct RecheckTimer {
    pub every: Duration,
    pub next_due: Instant,
}

impl RecheckTimer {
    pub fn new(every: Duration, now: Instant) -> Self {
        Self { every, next_due: now + every }
    }

    /// True when due; schedules the next tick.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.every;
        true
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub id: FrameId,
    pub screen: Screen,
    pub timer: Option<RecheckTimer>,
    pub notice: Option<Notice>,
}
