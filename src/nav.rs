//! Screen stack and command dispatch.
//!
//! The navigator is owned by the foreground loop. Background work never
//! touches it; results arrive as [`UiEvent`]s and are applied by [`Navigator::pump`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::actions::{self, ActionRequest, connect_params, scale_params};
use crate::cache::{CacheEngine, CacheEvent, EntrySnapshot, SubscriberId};
use crate::error::CoreError;
use crate::model::{AppConfig, ContextOrigin, KindId, ResourceRecord};
use crate::registry::{ActionParams, Registry};
use crate::remote::IdentityProbe;
use crate::session::{Session, SessionManager};
use crate::vault::{
    CredentialSource, EnvCredentials, ImportCandidate, JsonCredentialsFile, ProbedCandidate,
    probe_candidates,
};

mod dialog;
mod events;
mod input;
mod keys;
pub mod palette;
mod screen;

pub use self::dialog::{ContextDraft, Dialog, DialogKind, DraftStep, parse_capacity};
pub use self::events::{UiEvent, UiReceiver, UiSender, cache_sink, channel};
pub use self::input::Input;
pub use self::keys::{default_ssh_dir, has_public_key, list_ssh_keys};
pub use self::palette::{Builtin, Command, CommandDef, Suggestion};
pub use self::screen::{
    DescribeScreen, Frame, FrameId, ListScreen, Notice, NoticeLevel, PickerScreen, RecheckTimer,
    RelatedScreen, Screen,
};

const HOME_KIND: KindId = "instances";

#[derive(Clone, Debug)]
pub struct NavConfig {
    pub regions: Vec<String>,
    /// How often the visible list re-checks its entry.
    pub recheck: Duration,
    /// How often idle cache entries are swept.
    pub evict_every: Duration,
    /// Directory the key picker lists.
    pub ssh_dir: Option<PathBuf>,
}

impl NavConfig {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            regions: cfg.regions.clone(),
            recheck: Duration::from_millis(cfg.cache.recheck_ms.max(50)),
            evict_every: Duration::from_secs(30),
            ssh_dir: cfg.ssh_dir.clone().or_else(default_ssh_dir),
        }
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// A list screen's records after filtering, plus entry status.
#[derive(Clone, Debug)]
pub struct ListView {
    pub records: Vec<ResourceRecord>,
    pub snapshot: Option<EntrySnapshot>,
}

pub struct Navigator {
    sessions: SessionManager,
    cache: CacheEngine,
    probe: Arc<dyn IdentityProbe>,
    config: NavConfig,
    frames: Vec<Frame>,
    next_frame: u64,
    tx: UiSender,
    rx: UiReceiver,
    quit: bool,
    next_evict: Instant,
    /// Key picked for this run; wins over the instance's key and the default.
    ssh_key: Option<String>,
}

impl Navigator {
    pub fn new(
        sessions: SessionManager,
        cache: CacheEngine,
        probe: Arc<dyn IdentityProbe>,
        config: NavConfig,
        events: (UiSender, UiReceiver),
    ) -> Self {
        let next_evict = cache.now() + config.evict_every;
        let (tx, rx) = events;
        Self {
            sessions,
            cache,
            probe,
            config,
            frames: Vec::new(),
            next_frame: 1,
            tx,
            rx,
            quit: false,
            next_evict,
            ssh_key: None,
        }
    }

    /// Apply configured defaults and open the first screen.
    pub fn start(&mut self) {
        if self.sessions.apply_defaults() {
            self.reset_to_kind(HOME_KIND);
        } else {
            let picker = self.contexts_picker();
            self.reset_stack(Screen::Contexts(picker));
            if self.sessions.vault().is_empty() {
                self.notify(Notice::info(
                    "no contexts yet: `add`, `import env` or `import <file>` to add some",
                ));
            }
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn top_dialog_mut(&mut self) -> Option<&mut Dialog> {
        match self.frames.last_mut().map(|f| &mut f.screen) {
            Some(Screen::Dialog(d)) => Some(d),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.sessions.current().ok()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn cache(&self) -> &CacheEngine {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.cache.registry()
    }

    pub fn ssh_key(&self) -> Option<&str> {
        self.ssh_key.as_deref()
    }

    pub fn ssh_dir(&self) -> Option<&std::path::Path> {
        self.config.ssh_dir.as_deref()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    /// Attach a notice to the active screen.
    pub fn notify(&mut self, notice: Notice) {
        match self.frames.last_mut() {
            Some(f) => f.notice = Some(notice),
            None => debug!(text = %notice.text, "notice with no screen"),
        }
    }

    fn notify_err(&mut self, err: &CoreError) {
        self.notify(Notice::error(err.to_string()));
    }

    pub fn clear_notice(&mut self) {
        if let Some(f) = self.frames.last_mut() {
            f.notice = None;
        }
    }

    // ---- stack -------------------------------------------------------------

    /// Push a screen. Dialogs that need a session are refused without one.
    pub fn push(&mut self, screen: Screen) -> Result<FrameId, CoreError> {
        if let Screen::Dialog(d) = &screen
            && d.kind.requires_session()
            && !self.sessions.is_active()
        {
            return Err(CoreError::NoActiveSession);
        }
        let id = FrameId(self.next_frame);
        self.next_frame += 1;
        let now = self.cache.now();
        let timer = match &screen {
            Screen::Resources(l) => {
                self.cache.subscribe(&l.key, SubscriberId(id.0));
                Some(RecheckTimer::new(self.config.recheck, now))
            }
            _ => None,
        };
        let kind = match &screen {
            Screen::Resources(l) => Some(l.kind),
            _ => None,
        };
        debug!(frame = id.0, screen = %screen.title(), "push");
        self.frames.push(Frame {
            id,
            screen,
            timer,
            notice: None,
        });
        if let Some(kind) = kind {
            self.ensure_fresh(kind);
        }
        Ok(id)
    }

    /// Pop the top frame. The bottom frame stays; returns false then.
    pub fn pop(&mut self) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        if let Some(frame) = self.frames.pop() {
            self.release(&frame);
        }
        true
    }

    pub fn replace_top(&mut self, screen: Screen) -> Result<FrameId, CoreError> {
        if let Screen::Dialog(d) = &screen
            && d.kind.requires_session()
            && !self.sessions.is_active()
        {
            return Err(CoreError::NoActiveSession);
        }
        if let Some(frame) = self.frames.pop() {
            self.release(&frame);
        }
        self.push(screen)
    }

    fn reset_stack(&mut self, screen: Screen) {
        for frame in std::mem::take(&mut self.frames) {
            self.release(&frame);
        }
        if let Err(err) = self.push(screen) {
            debug!(error = %err, "reset to a screen that could not open");
        }
    }

    /// Closing a list stops updates to it. A refresh it started keeps going.
    fn release(&self, frame: &Frame) {
        if let Screen::Resources(l) = &frame.screen {
            self.cache.unsubscribe(&l.key, SubscriberId(frame.id.0));
        }
        debug!(frame = frame.id.0, "frame closed");
    }

    fn open_dialog(&mut self, dialog: Dialog) -> bool {
        match self.push(Screen::Dialog(dialog)) {
            Ok(_) => true,
            Err(err) => {
                self.notify_err(&err);
                false
            }
        }
    }

    // ---- commands ----------------------------------------------------------

    /// Run one palette line.
    pub fn dispatch(&mut self, line: &str) {
        let parsed = palette::parse(self.cache.registry(), line);
        match parsed {
            Ok(None) => {}
            Err(msg) => self.notify(Notice::error(msg)),
            Ok(Some(Command::Builtin(b, args))) => self.run_builtin(b, args),
            Ok(Some(Command::Kind(desc, args))) => {
                self.open_kind(desc.kind);
                if let Some(filter) = args.first() {
                    self.set_filter(filter);
                }
            }
        }
    }

    pub fn suggestions(&self, input: &str) -> Vec<Suggestion> {
        palette::suggestions(self.cache.registry(), input, 8)
    }

    fn run_builtin(&mut self, b: Builtin, args: Vec<String>) {
        match b {
            Builtin::Quit => self.quit = true,
            Builtin::Help => {
                let lines = self.help_lines();
                let _ = self.push(Screen::Help { lines, scroll: 0 });
            }
            Builtin::Context => match args.first() {
                Some(name) => self.activate_context(name),
                None => {
                    let picker = self.contexts_picker();
                    let _ = self.push(Screen::Contexts(picker));
                }
            },
            Builtin::Region => match args.first() {
                Some(region) => self.switch_region(region),
                None => {
                    let picker = self.regions_picker();
                    let _ = self.push(Screen::Regions(picker));
                }
            },
            Builtin::Refresh => self.refresh_current(),
            Builtin::Import => match args.first().map(|s| s.as_str()) {
                None => {
                    self.open_dialog(Dialog::new(DialogKind::ImportFile));
                }
                Some("env") => {
                    let name = args.get(1).cloned().unwrap_or_else(|| "env".to_string());
                    self.start_import(Box::new(EnvCredentials::new(name)));
                }
                Some(path) => self.start_import(Box::new(JsonCredentialsFile::new(path))),
            },
            Builtin::Add => self.open_add_context(),
            Builtin::Keys => {
                let picker = self.keys_picker();
                let _ = self.push(Screen::Keys(picker));
            }
        }
    }

    /// Open a list of `kind`, replacing the current list if there is one.
    pub fn open_kind(&mut self, kind: KindId) {
        let session = match self.sessions.current() {
            Ok(s) => s,
            Err(err) => return self.notify_err(&err),
        };
        let Some(desc) = self.registry().get(kind) else {
            return self.notify_err(&CoreError::not_found("resource kind", kind));
        };
        let screen = Screen::Resources(ListScreen {
            kind: desc.kind,
            key: crate::cache::CacheKey::for_session(&session, desc.kind),
            selected: 0,
            filter: String::new(),
            seen_version: 0,
            warning: None,
        });
        let top_is_list = matches!(
            self.top().map(|f| &f.screen),
            Some(Screen::Resources(_))
        );
        let res = if top_is_list {
            self.replace_top(screen)
        } else {
            self.push(screen)
        };
        if let Err(err) = res {
            self.notify_err(&err);
        }
    }

    fn reset_to_kind(&mut self, kind: KindId) {
        for frame in std::mem::take(&mut self.frames) {
            self.release(&frame);
        }
        self.open_kind(kind);
        if self.frames.is_empty() {
            let picker = self.contexts_picker();
            self.reset_stack(Screen::Contexts(picker));
        }
    }

    pub fn activate_context(&mut self, name: &str) {
        let region = self.sessions.region_for(name);
        match self.sessions.activate(name, &region) {
            Ok(session) => {
                self.cache.clear();
                self.reset_to_kind(HOME_KIND);
                self.notify(Notice::success(format!(
                    "context {} ({}, account {})",
                    session.context_name(),
                    session.region(),
                    session.context().account_label()
                )));
            }
            Err(err) => self.notify_err(&err),
        }
    }

    pub fn switch_region(&mut self, region: &str) {
        let kind = self
            .frames
            .first()
            .and_then(|f| match &f.screen {
                Screen::Resources(l) => Some(l.kind),
                _ => None,
            })
            .unwrap_or(HOME_KIND);
        match self.sessions.switch_region(region) {
            Ok(session) => {
                self.cache.clear();
                self.reset_to_kind(kind);
                self.notify(Notice::success(format!("region {}", session.region())));
            }
            Err(err) => self.notify_err(&err),
        }
    }

    fn ensure_fresh(&mut self, kind: KindId) {
        let Ok(session) = self.sessions.current() else {
            return;
        };
        if let Err(err) = self.cache.ensure_fresh(&session, kind) {
            self.notify_err(&err);
        }
    }

    /// Reload whatever the active screen shows.
    pub fn refresh_current(&mut self) {
        let Some(top) = self.top() else { return };
        match &top.screen {
            Screen::Resources(l) => {
                let (key, kind) = (l.key.clone(), l.kind);
                self.cache.invalidate(&key);
                self.ensure_fresh(kind);
            }
            Screen::Contexts(_) => {
                let picker = self.contexts_picker();
                if let Some(f) = self.top_mut() {
                    f.screen = Screen::Contexts(picker);
                }
            }
            Screen::Keys(_) => {
                let picker = self.keys_picker();
                if let Some(f) = self.top_mut() {
                    f.screen = Screen::Keys(picker);
                }
            }
            Screen::Describe(d) => {
                let (kind, id) = (d.kind, d.id.clone());
                self.request_describe(kind, id);
            }
            Screen::Related(r) => {
                let (kind, id) = (r.kind, r.id.clone());
                self.request_related(kind, id);
            }
            _ => self.notify(Notice::info("nothing to refresh here")),
        }
    }

    // ---- selection ---------------------------------------------------------

    pub fn list_view(&self, list: &ListScreen) -> ListView {
        let snapshot = self.cache.snapshot(&list.key);
        let records = snapshot
            .as_ref()
            .map(|s| {
                s.records
                    .iter()
                    .filter(|r| r.matches_filter(&list.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ListView { records, snapshot }
    }

    fn row_count(&self, screen: &Screen) -> usize {
        match screen {
            Screen::Resources(l) => self.list_view(l).records.len(),
            Screen::Related(r) => r.rows().len(),
            Screen::Contexts(p) | Screen::Regions(p) | Screen::Keys(p) => p.items.len(),
            Screen::Describe(d) => d.lines.as_ref().map_or(0, |l| l.len()),
            Screen::Help { lines, .. } => lines.len(),
            Screen::Dialog(_) => 0,
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        let Some(top) = self.frames.last() else { return };
        let count = self.row_count(&top.screen);
        let Some(top) = self.frames.last_mut() else { return };
        let slot = match &mut top.screen {
            Screen::Resources(l) => &mut l.selected,
            Screen::Related(r) => &mut r.selected,
            Screen::Contexts(p) | Screen::Regions(p) | Screen::Keys(p) => &mut p.selected,
            Screen::Describe(d) => &mut d.scroll,
            Screen::Help { scroll, .. } => scroll,
            Screen::Dialog(_) => return,
        };
        let max = count.saturating_sub(1) as isize;
        *slot = (*slot as isize + delta).clamp(0, max.max(0)) as usize;
    }

    pub fn set_filter(&mut self, filter: &str) {
        if let Some(Frame {
            screen: Screen::Resources(l),
            ..
        }) = self.frames.last_mut()
        {
            l.filter = filter.to_string();
            l.selected = 0;
        }
    }

    /// Record under the cursor on a list or related screen.
    pub fn selected_record(&self) -> Option<(KindId, ResourceRecord)> {
        match &self.top()?.screen {
            Screen::Resources(l) => {
                let view = self.list_view(l);
                let rec = view.records.get(l.selected)?.clone();
                Some((l.kind, rec))
            }
            Screen::Related(r) => {
                let (kind, id) = r.rows().get(r.selected)?.clone();
                let rec = r
                    .groups
                    .iter()
                    .flatten()
                    .flat_map(|g| g.records.iter())
                    .find(|rec| rec.id == id)
                    .cloned()
                    .unwrap_or_else(|| ResourceRecord::new(id));
                Some((kind, rec))
            }
            _ => None,
        }
    }

    /// Enter on the active screen.
    pub fn activate_selected(&mut self) {
        let Some(top) = self.top() else { return };
        match &top.screen {
            Screen::Resources(_) => self.open_related(),
            Screen::Related(_) => self.open_describe(),
            Screen::Contexts(p) => {
                if let Some(name) = p.items.get(p.selected).cloned() {
                    self.activate_context(&name);
                }
            }
            Screen::Regions(p) => {
                if let Some(region) = p.items.get(p.selected).cloned() {
                    self.switch_region(&region);
                }
            }
            Screen::Keys(p) => {
                if let Some(key) = p.items.get(p.selected).cloned() {
                    info!(key = %key, "ssh key selected for this run");
                    self.notify(Notice::success(format!("using ssh key {}", key)));
                    self.ssh_key = Some(key);
                }
            }
            Screen::Dialog(_) => self.submit_dialog(),
            Screen::Describe(_) | Screen::Help { .. } => {
                self.pop();
            }
        }
    }

    pub fn open_describe(&mut self) {
        let Some((kind, rec)) = self.selected_record() else {
            return self.notify(Notice::info("nothing selected"));
        };
        let lines = rec.raw.as_ref().map(|_| describe_lines(&rec));
        let pending = lines.is_none();
        let screen = Screen::Describe(DescribeScreen {
            kind,
            id: rec.id.clone(),
            lines,
            scroll: 0,
        });
        if self.push(screen).is_ok() && pending {
            self.request_describe(kind, rec.id);
        }
    }

    fn request_describe(&mut self, kind: KindId, id: String) {
        let (Some(frame), Ok(session)) = (self.top().map(|f| f.id), self.sessions.current()) else {
            return;
        };
        let cache = self.cache.clone();
        let tx = self.tx.clone();
        self.cache.spawner().spawn(move || {
            let result = cache.describe(&session, kind, &id);
            let _ = tx.send(UiEvent::Described { frame, result });
        });
    }

    pub fn open_related(&mut self) {
        let Some((kind, rec)) = self.selected_record() else {
            return self.notify(Notice::info("nothing selected"));
        };
        if self.registry().relations_from(kind).is_empty() {
            return self.notify(Notice::info(format!("{} has no related resources", kind)));
        }
        let screen = Screen::Related(RelatedScreen {
            kind,
            id: rec.id.clone(),
            groups: None,
            selected: 0,
        });
        if self.push(screen).is_ok() {
            self.request_related_for(kind, rec);
        }
    }

    fn request_related(&mut self, kind: KindId, id: String) {
        let key = self
            .session()
            .map(|s| crate::cache::CacheKey::for_session(&s, kind));
        let rec = key
            .and_then(|k| self.cache.record(&k, &id))
            .unwrap_or_else(|| ResourceRecord::new(id));
        self.request_related_for(kind, rec);
    }

    fn request_related_for(&mut self, kind: KindId, record: ResourceRecord) {
        let (Some(frame), Ok(session)) = (self.top().map(|f| f.id), self.sessions.current()) else {
            return;
        };
        let cache = self.cache.clone();
        let tx = self.tx.clone();
        self.cache.spawner().spawn(move || {
            let result = cache.related(&session, kind, &record);
            let _ = tx.send(UiEvent::RelatedResolved { frame, result });
        });
    }

    // ---- actions -----------------------------------------------------------

    /// Run the action bound to `key` on the selected record. Returns false if
    /// the key is not an action hotkey here.
    pub fn action_hotkey(&mut self, key: char) -> bool {
        let Some((kind, rec)) = self.selected_record() else {
            return false;
        };
        if !matches!(self.top().map(|f| &f.screen), Some(Screen::Resources(_))) {
            return false;
        }
        let Some(def) = self.registry().get(kind).and_then(|d| d.action_for_key(key)) else {
            return false;
        };
        self.request_action(kind, def.name, &rec);
        true
    }

    /// Start `action` on `record`, opening whatever dialog it needs first.
    pub fn request_action(&mut self, kind: KindId, action: &str, record: &ResourceRecord) {
        let Some(def) = self.registry().get(kind).and_then(|d| d.action(action)) else {
            return self.notify_err(&CoreError::not_found(format!("{} action", kind), action));
        };
        match def.params {
            ActionParams::DesiredCapacity => {
                let dialog = Dialog::new(DialogKind::ScaleInput {
                    kind,
                    id: record.id.clone(),
                    min: record.attr_i64("min"),
                    max: record.attr_i64("max"),
                })
                .with_input(record.attr_text("desired"));
                self.open_dialog(dialog);
            }
            ActionParams::SshUser => {
                let key = self
                    .ssh_key
                    .clone()
                    .or_else(|| Some(record.attr_text("key")).filter(|k| !k.is_empty()))
                    .or_else(|| self.sessions.defaults().ssh_key.clone());
                let user = key
                    .as_deref()
                    .and_then(|k| self.sessions.ssh_username_for(k))
                    .unwrap_or("ec2-user")
                    .to_string();
                let dialog = Dialog::new(DialogKind::ConnectInput {
                    kind,
                    id: record.id.clone(),
                    key,
                })
                .with_input(user);
                self.open_dialog(dialog);
            }
            ActionParams::None => {
                let req = ActionRequest::new(kind, def.name, vec![record.id.clone()]);
                match actions::prepare(self.session(), &self.cache, req.clone()) {
                    Err(err) => self.notify_err(&err),
                    Ok(_) if def.confirm => {
                        let prompt = format!("{} {} {}?", def.label, kind, record.id);
                        self.open_dialog(Dialog::new(DialogKind::ConfirmAction {
                            request: req,
                            prompt,
                        }));
                    }
                    Ok(_) => self.invoke(req),
                }
            }
        }
    }

    fn invoke(&mut self, req: ActionRequest) {
        let tx = self.tx.clone();
        actions::invoke(self.session(), &self.cache, req, move |outcome| {
            let _ = tx.send(UiEvent::ActionFinished(outcome));
        });
    }

    /// Enter / `y` on a dialog.
    pub fn submit_dialog(&mut self) {
        let Some(dialog) = self.top_dialog_mut() else {
            return;
        };
        let kind = dialog.kind.clone();
        let text = dialog.input.text().trim().to_string();
        match kind {
            DialogKind::ConfirmAction { request, .. } => {
                self.pop();
                self.invoke(request);
            }
            DialogKind::ScaleInput { kind, id, .. } => {
                let (desired, widen) = match parse_capacity(&text) {
                    Ok(v) => v,
                    Err(msg) => return self.dialog_error(msg),
                };
                let req = ActionRequest::new(kind, "scale", vec![id])
                    .with_params(scale_params(desired, widen));
                self.submit_prepared(req);
            }
            DialogKind::ConnectInput { kind, id, key } => {
                if text.is_empty() {
                    return self.dialog_error("a login name is required".to_string());
                }
                let req = ActionRequest::new(kind, "connect", vec![id])
                    .with_params(connect_params(&text, key.as_deref()));
                if let Some(k) = key.as_deref()
                    && self.sessions.ssh_username_for(k) != Some(text.as_str())
                    && let Err(err) = self.sessions.set_ssh_username(k, &text)
                {
                    debug!(error = %err, "could not remember ssh login name");
                }
                self.submit_prepared(req);
            }
            DialogKind::ImportFile => {
                if text.is_empty() {
                    return self.dialog_error("enter a file path".to_string());
                }
                self.pop();
                self.start_import(Box::new(JsonCredentialsFile::new(text)));
            }
            DialogKind::DeleteContext { name } => {
                self.pop();
                self.delete_context(&name);
            }
            DialogKind::AddContext(mut draft) => {
                if draft.verifying {
                    return;
                }
                let done = match draft.accept(&text) {
                    Ok(done) => done,
                    Err(msg) => return self.dialog_error(msg),
                };
                draft.verifying = done;
                let candidate = done.then(|| draft.candidate());
                let input = draft.current().to_string();
                let frame = self.top().map(|f| f.id);
                if let Some(d) = self.top_dialog_mut() {
                    d.update(DialogKind::AddContext(draft), input);
                }
                if let (Some(candidate), Some(frame)) = (candidate, frame) {
                    self.verify_context(frame, candidate);
                }
            }
            DialogKind::SshUsername { key } => {
                self.pop();
                let res = if text.is_empty() {
                    self.sessions.clear_ssh_username(&key)
                } else {
                    self.sessions.set_ssh_username(&key, &text)
                };
                match res {
                    Ok(()) => {
                        self.refresh_keys();
                        let msg = if text.is_empty() {
                            format!("forgot the login name for {}", key)
                        } else {
                            format!("{} logs in as {}", key, text)
                        };
                        self.notify(Notice::success(msg));
                    }
                    Err(err) => self.notify_err(&err),
                }
            }
        }
    }

    fn submit_prepared(&mut self, req: ActionRequest) {
        match actions::prepare(self.session(), &self.cache, req.clone()) {
            Ok(_) => {
                self.pop();
                self.invoke(req);
            }
            Err(err) => self.dialog_error(err.to_string()),
        }
    }

    fn dialog_error(&mut self, msg: String) {
        if let Some(d) = self.top_dialog_mut() {
            d.error = Some(msg);
        }
    }

    // ---- contexts ----------------------------------------------------------

    fn contexts_picker(&self) -> PickerScreen {
        let items = self.sessions.vault().names();
        let selected = self
            .session()
            .and_then(|s| items.iter().position(|n| n == s.context_name()))
            .unwrap_or(0);
        PickerScreen { items, selected }
    }

    fn regions_picker(&self) -> PickerScreen {
        let items = self.config.regions.clone();
        let selected = self
            .session()
            .and_then(|s| items.iter().position(|r| r == s.region()))
            .unwrap_or(0);
        PickerScreen { items, selected }
    }

    /// Make the selected context, region or key the startup default.
    pub fn set_default_selected(&mut self) {
        let target = self.top().and_then(|f| {
            let p = f.screen.picker()?;
            let name = p.items.get(p.selected)?.clone();
            let what = match &f.screen {
                Screen::Contexts(_) => "context",
                Screen::Regions(_) => "region",
                _ => "ssh key",
            };
            Some((what, name))
        });
        let Some((what, name)) = target else {
            return;
        };
        let res = match what {
            "context" => self
                .sessions
                .set_default_context(&name)
                .map(|_| format!("default context set to {}", name)),
            "region" => self
                .sessions
                .set_default_region(&name)
                .map(|_| format!("default region set to {}", name)),
            _ => self
                .sessions
                .set_default_ssh_key(Some(&name))
                .map(|_| format!("default ssh key set to {}", name)),
        };
        match res {
            Ok(msg) => self.notify(Notice::success(msg)),
            Err(err) => self.notify_err(&err),
        }
    }

    /// Ask before deleting the selected context.
    pub fn delete_selected(&mut self) {
        if let Some(Screen::Contexts(p)) = self.top().map(|f| &f.screen)
            && let Some(name) = p.items.get(p.selected).cloned()
        {
            self.open_dialog(Dialog::new(DialogKind::DeleteContext { name }));
        }
    }

    fn delete_context(&mut self, name: &str) {
        let was_active = self
            .session()
            .is_some_and(|s| s.context_name() == name);
        match self.sessions.delete_context(name) {
            Ok(true) => {
                if was_active {
                    self.cache.clear();
                    let picker = self.contexts_picker();
                    self.reset_stack(Screen::Contexts(picker));
                } else {
                    self.refresh_pickers();
                }
                self.notify(Notice::success(format!("deleted context {}", name)));
            }
            Ok(false) => self.notify_err(&CoreError::not_found("context", name)),
            Err(err) => self.notify_err(&err),
        }
    }

    fn refresh_pickers(&mut self) {
        let picker = self.contexts_picker();
        for f in &mut self.frames {
            if let Screen::Contexts(p) = &mut f.screen {
                let selected = p.selected.min(picker.items.len().saturating_sub(1));
                *p = PickerScreen {
                    items: picker.items.clone(),
                    selected,
                };
            }
        }
    }

    /// Open the add-context dialog at its first field.
    pub fn open_add_context(&mut self) {
        self.open_dialog(Dialog::new(DialogKind::AddContext(ContextDraft::default())));
    }

    /// Verify hand-entered keys on a worker; the dialog in `frame` gets the
    /// verdict in `pump`.
    fn verify_context(&mut self, frame: FrameId, candidate: ImportCandidate) {
        let probe = self.probe.clone();
        let tx = self.tx.clone();
        info!(context = %candidate.name, "verifying hand-entered context");
        self.cache.spawner().spawn(move || {
            let probed = probe_candidates(vec![candidate], probe.as_ref());
            let _ = tx.send(UiEvent::ContextVerified { frame, probed });
        });
    }

    fn finish_add_context(&mut self, frame: FrameId, probed: Vec<ProbedCandidate>) {
        let Some(pos) = self.frames.iter().position(|f| f.id == frame) else {
            debug!(frame = frame.0, "add-context dialog closed before verification finished");
            return;
        };
        let report = match self
            .sessions
            .vault_mut()
            .admit_as(probed, ContextOrigin::Manual)
        {
            Ok(r) => r,
            Err(err) => return self.notify_err(&err),
        };
        if let Some((_, reason)) = report.skipped.into_iter().next() {
            if let Some(Frame {
                screen: Screen::Dialog(d),
                ..
            }) = self.frames.get_mut(pos)
                && let DialogKind::AddContext(draft) = &d.kind
            {
                let mut draft = draft.clone();
                draft.retry();
                let input = draft.current().to_string();
                d.update(DialogKind::AddContext(draft), input);
                d.error = Some(format!("key verification failed: {}", reason));
            }
            return;
        }
        let frame = self.frames.remove(pos);
        self.release(&frame);
        let name = report.imported.join(", ");
        if let Some(active) = self.session()
            && report.imported.iter().any(|n| n == active.context_name())
        {
            let region = active.region().to_string();
            self.switch_region(&region);
        }
        self.refresh_pickers();
        self.notify(Notice::success(format!("added context {}", name)));
    }

    // ---- ssh keys ----------------------------------------------------------

    fn keys_picker(&self) -> PickerScreen {
        let items = self
            .config
            .ssh_dir
            .as_deref()
            .map(list_ssh_keys)
            .unwrap_or_default();
        let current = self
            .ssh_key
            .as_deref()
            .or(self.sessions.defaults().ssh_key.as_deref());
        let selected = current
            .and_then(|k| items.iter().position(|i| i == k))
            .unwrap_or(0);
        PickerScreen { items, selected }
    }

    fn refresh_keys(&mut self) {
        let picker = self.keys_picker();
        for f in &mut self.frames {
            if let Screen::Keys(p) = &mut f.screen {
                let selected = p.selected.min(picker.items.len().saturating_sub(1));
                *p = PickerScreen {
                    items: picker.items.clone(),
                    selected,
                };
            }
        }
    }

    /// Ask for the login name to use with the selected key.
    pub fn edit_key_username(&mut self) {
        if let Some(Screen::Keys(p)) = self.top().map(|f| &f.screen)
            && let Some(key) = p.items.get(p.selected).cloned()
        {
            let user = self.sessions.ssh_username_for(&key).unwrap_or_default().to_string();
            self.open_dialog(Dialog::new(DialogKind::SshUsername { key }).with_input(user));
        }
    }

    /// Probe a source's candidates on a worker; admission happens in `pump`.
    pub fn start_import(&mut self, source: Box<dyn CredentialSource + Send>) {
        let probe = self.probe.clone();
        let tx = self.tx.clone();
        self.notify(Notice::info(format!("importing from {}...", source.label())));
        self.cache.spawner().spawn(move || {
            let label = source.label();
            let result = source
                .candidates()
                .map(|c| probe_candidates(c, probe.as_ref()))
                .map_err(|e| format!("{:#}", e));
            let _ = tx.send(UiEvent::ImportProbed {
                source: label,
                result,
            });
        });
    }

    // ---- event pump --------------------------------------------------------

    /// Apply every queued background result. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(ev) = self.rx.try_recv() {
            self.apply(ev);
            n += 1;
        }
        n
    }

    fn apply(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::Cache(CacheEvent::Updated { key, version }) => {
                for f in &mut self.frames {
                    if let Screen::Resources(l) = &mut f.screen
                        && l.key == key
                    {
                        l.seen_version = version;
                        l.warning = None;
                    }
                }
                self.clamp_selections();
            }
            UiEvent::Cache(CacheEvent::Failed {
                key,
                version,
                error,
            }) => {
                for f in &mut self.frames {
                    if let Screen::Resources(l) = &mut f.screen
                        && l.key == key
                    {
                        l.seen_version = version;
                        l.warning = Some(error.clone());
                        f.notice = Some(Notice::error(format!(
                            "refresh failed, showing last known data: {}",
                            error
                        )));
                    }
                }
            }
            UiEvent::Cache(CacheEvent::Described { .. } | CacheEvent::Evicted { .. }) => {}
            UiEvent::ActionFinished(outcome) => {
                let notice = match &outcome.result {
                    Ok(msg) => Notice::success(msg.clone()),
                    Err(err) => Notice::error(err.to_string()),
                };
                self.notify(notice);
                let visible_kind = self.frames.iter().any(|f| {
                    matches!(&f.screen, Screen::Resources(l) if l.kind == outcome.kind)
                });
                if visible_kind {
                    self.ensure_fresh(outcome.kind);
                }
            }
            UiEvent::Described { frame, result } => {
                let Some(f) = self.frames.iter_mut().find(|f| f.id == frame) else {
                    debug!(frame = frame.0, "describe result for a closed screen");
                    return;
                };
                if let Screen::Describe(d) = &mut f.screen {
                    match result {
                        Ok(rec) => d.lines = Some(describe_lines(&rec)),
                        Err(err) => {
                            d.lines = Some(Vec::new());
                            f.notice = Some(Notice::error(err.to_string()));
                        }
                    }
                }
            }
            UiEvent::RelatedResolved { frame, result } => {
                let Some(f) = self.frames.iter_mut().find(|f| f.id == frame) else {
                    debug!(frame = frame.0, "related result for a closed screen");
                    return;
                };
                if let Screen::Related(r) = &mut f.screen {
                    match result {
                        Ok(groups) => r.groups = Some(groups),
                        Err(err) => {
                            r.groups = Some(Vec::new());
                            f.notice = Some(Notice::error(err.to_string()));
                        }
                    }
                }
            }
            UiEvent::ContextVerified { frame, probed } => self.finish_add_context(frame, probed),
            UiEvent::ImportProbed { source, result } => {
                let probed = match result {
                    Ok(p) => p,
                    Err(msg) => return self.notify(Notice::error(format!("import: {}", msg))),
                };
                match self.sessions.vault_mut().admit(probed) {
                    Ok(report) => {
                        info!(source = %source, imported = report.imported.len(), skipped = report.skipped.len(), "import finished");
                        let mut text = format!(
                            "imported {} context(s), skipped {}",
                            report.imported.len(),
                            report.skipped.len()
                        );
                        for (name, reason) in &report.skipped {
                            text.push_str(&format!("; {}: {}", name, reason));
                        }
                        let notice = if report.imported.is_empty() && !report.skipped.is_empty() {
                            Notice::error(text)
                        } else {
                            Notice::success(text)
                        };
                        self.refresh_pickers();
                        self.notify(notice);
                    }
                    Err(err) => self.notify_err(&err),
                }
            }
        }
    }

    fn clamp_selections(&mut self) {
        let counts: Vec<usize> = self.frames.iter().map(|f| self.row_count(&f.screen)).collect();
        for (f, count) in self.frames.iter_mut().zip(counts) {
            if let Screen::Resources(l) = &mut f.screen {
                l.selected = l.selected.min(count.saturating_sub(1));
            }
        }
    }

    /// Periodic work: re-check the visible list and sweep idle entries.
    pub fn tick(&mut self) {
        let now = self.cache.now();
        let due = self
            .frames
            .iter_mut()
            .rev()
            .find(|f| !f.screen.is_dialog())
            .and_then(|f| match (&f.screen, f.timer.as_mut()) {
                (Screen::Resources(l), Some(t)) => t.fire(now).then_some(l.kind),
                _ => None,
            });
        if let Some(kind) = due {
            self.ensure_fresh(kind);
        }
        if now >= self.next_evict {
            self.next_evict = now + self.config.evict_every;
            let n = self.cache.evict_idle();
            if n > 0 {
                debug!(evicted = n, "idle sweep");
            }
        }
    }

    // ---- text --------------------------------------------------------------

    pub fn help_lines(&self) -> Vec<String> {
        let mut lines = vec!["Commands (type `:` to open the palette):".to_string()];
        for d in palette::builtin_defs() {
            let aliases = if d.aliases.is_empty() {
                String::new()
            } else {
                format!(" ({})", d.aliases.join(", "))
            };
            lines.push(format!("  {:<22} {}{}", d.usage, d.help, aliases));
        }
        lines.push(String::new());
        lines.push("Resource kinds:".to_string());
        for d in self.registry().kinds() {
            lines.push(format!("  {:<22} {}", d.command_name(), d.aliases.join(", ")));
            for a in d.actions {
                lines.push(format!("      [{}] {}", a.hotkey, a.label));
            }
        }
        lines.push(String::new());
        lines.push("Keys: j/k move  Enter related  d describe  / filter  r refresh  Esc back".into());
        lines.push("Contexts/regions: Enter select  D set default  x delete  a add context".into());
        lines.push("SSH keys: Enter use for this run  D set default  e login name".into());
        lines
    }

    /// Header text: context, account and region of the active session.
    pub fn status_line(&self) -> String {
        match self.session() {
            Some(s) => format!(
                "{}  acct {}  {}",
                s.context_name(),
                s.context().account_label(),
                s.region()
            ),
            None => "no active context".to_string(),
        }
    }
}

fn describe_lines(rec: &ResourceRecord) -> Vec<String> {
    let mut lines = Vec::new();
    if !rec.relations.is_empty() {
        lines.push("relations:".to_string());
        for r in &rec.relations {
            lines.push(format!("  {}", r));
        }
        lines.push(String::new());
    }
    match rec.raw.as_deref() {
        Some(raw) => {
            let text = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
            lines.extend(text.lines().map(|l| l.to_string()));
        }
        None => {
            for (k, v) in &rec.attributes {
                lines.push(format!("{}: {}", k, v));
            }
        }
    }
    lines
}
