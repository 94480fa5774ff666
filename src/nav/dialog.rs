use std::fmt;

use crate::actions::ActionRequest;
use crate::model::{Credentials, KindId};
use crate::vault::ImportCandidate;

use super::input::Input;

#[derive(Clone, Debug, PartialEq)]
pub enum DialogKind {
    /// Yes/no before a destructive action.
    ConfirmAction { request: ActionRequest, prompt: String },
    /// New desired capacity for an autoscaling group.
    ScaleInput {
        kind: KindId,
        id: String,
        min: Option<i64>,
        max: Option<i64>,
    },
    /// Login name for a connect action.
    ConnectInput {
        kind: KindId,
        id: String,
        key: Option<String>,
    },
    /// Path to a JSON credentials file.
    ImportFile,
    DeleteContext { name: String },
    /// A context typed in by hand, verified before it is stored.
    AddContext(ContextDraft),
    /// Default login name for an SSH key.
    SshUsername { key: String },
}

impl DialogKind {
    /// Dialogs acting on live resources need an active session.
    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            DialogKind::ConfirmAction { .. }
                | DialogKind::ScaleInput { .. }
                | DialogKind::ConnectInput { .. }
        )
    }

    pub fn has_input(&self) -> bool {
        matches!(
            self,
            DialogKind::ScaleInput { .. }
                | DialogKind::ConnectInput { .. }
                | DialogKind::ImportFile
                | DialogKind::AddContext(_)
                | DialogKind::SshUsername { .. }
        )
    }

    /// The input holds a secret and is drawn masked.
    pub fn masks_input(&self) -> bool {
        matches!(self, DialogKind::AddContext(d) if d.step == DraftStep::SecretKey)
    }

    pub fn title(&self) -> String {
        match self {
            DialogKind::ConfirmAction { .. } => "Confirm".to_string(),
            DialogKind::ScaleInput { id, .. } => format!("Scale {}", id),
            DialogKind::ConnectInput { id, .. } => format!("Connect to {}", id),
            DialogKind::ImportFile => "Import contexts".to_string(),
            DialogKind::DeleteContext { name } => format!("Delete context {}", name),
            DialogKind::AddContext(_) => "Add context".to_string(),
            DialogKind::SshUsername { key } => format!("Login name for {}", key),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Dialog {
    pub kind: DialogKind,
    pub lines: Vec<String>,
    pub input: Input,
    /// Validation message shown under the input.
    pub error: Option<String>,
}

impl Dialog {
    pub fn new(kind: DialogKind) -> Self {
        let lines = Self::lines_for(&kind);
        Self {
            kind,
            lines,
            input: Input::default(),
            error: None,
        }
    }

    pub fn with_input(mut self, text: impl Into<String>) -> Self {
        self.input = Input::with_text(text);
        self
    }

    /// Swap in a new kind, rebuilding the text and clearing any error.
    pub fn update(&mut self, kind: DialogKind, input: impl Into<String>) {
        self.lines = Self::lines_for(&kind);
        self.kind = kind;
        self.input = Input::with_text(input);
        self.error = None;
    }

    fn lines_for(kind: &DialogKind) -> Vec<String> {
        match kind {
            DialogKind::ConfirmAction { prompt, .. } => {
                vec![prompt.clone(), String::new(), "y/Enter: confirm   n/Esc: cancel".into()]
            }
            DialogKind::ScaleInput { min, max, .. } => vec![
                format!(
                    "Current limits: min {} max {}",
                    fmt_limit(*min),
                    fmt_limit(*max)
                ),
                "Enter a desired capacity. Append `!` to widen min/max to fit.".into(),
            ],
            DialogKind::ConnectInput { key, .. } => vec![format!(
                "Key: {}",
                key.as_deref().unwrap_or("(none)")
            )],
            DialogKind::ImportFile => vec![
                "JSON array of {name, access_key_id, secret_access_key, region}.".into(),
                "Each entry is validated before it is stored.".into(),
            ],
            DialogKind::DeleteContext { name } => vec![
                format!("Remove `{}` from the vault?", name),
                String::new(),
                "y/Enter: delete   n/Esc: cancel".into(),
            ],
            DialogKind::AddContext(draft) => draft.lines(),
            DialogKind::SshUsername { key } => vec![
                format!("Used when connecting with `{}`.", key),
                "Leave blank to forget it.".into(),
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DraftStep {
    #[default]
    Name,
    AccessKey,
    SecretKey,
    Region,
}

impl DraftStep {
    fn label(self) -> &'static str {
        match self {
            DraftStep::Name => "Name",
            DraftStep::AccessKey => "Access key",
            DraftStep::SecretKey => "Secret key",
            DraftStep::Region => "Default region",
        }
    }
}

/// Fields of a hand-entered context, filled one step at a time.
#[derive(Clone, Default, PartialEq)]
pub struct ContextDraft {
    pub name: String,
    pub access_key_id: String,
    secret_access_key: String,
    pub region: String,
    pub step: DraftStep,
    /// Set while the keys are being verified; further submits are ignored.
    pub verifying: bool,
}

impl fmt::Debug for ContextDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextDraft")
            .field("name", &self.name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("step", &self.step)
            .field("verifying", &self.verifying)
            .finish()
    }
}

impl ContextDraft {
    /// Store `text` in the current field and move on. Returns true once the
    /// last field is accepted.
    pub fn accept(&mut self, text: &str) -> Result<bool, String> {
        let text = text.trim();
        let required = !matches!(self.step, DraftStep::Region);
        if required && text.is_empty() {
            return Err(format!("{} cannot be blank", self.step.label().to_lowercase()));
        }
        let (slot, next) = match self.step {
            DraftStep::Name => (&mut self.name, Some(DraftStep::AccessKey)),
            DraftStep::AccessKey => (&mut self.access_key_id, Some(DraftStep::SecretKey)),
            DraftStep::SecretKey => (&mut self.secret_access_key, Some(DraftStep::Region)),
            DraftStep::Region => (&mut self.region, None),
        };
        *slot = text.to_string();
        match next {
            Some(step) => {
                self.step = step;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Current value of the field being edited; the secret is never echoed.
    pub fn current(&self) -> &str {
        match self.step {
            DraftStep::Name => &self.name,
            DraftStep::AccessKey => &self.access_key_id,
            DraftStep::SecretKey => "",
            DraftStep::Region => &self.region,
        }
    }

    /// Back to the access key after a rejected verification.
    pub fn retry(&mut self) {
        self.verifying = false;
        self.step = DraftStep::AccessKey;
        self.secret_access_key.clear();
    }

    pub fn candidate(&self) -> ImportCandidate {
        ImportCandidate {
            name: self.name.clone(),
            credentials: Credentials::new(&self.access_key_id, &self.secret_access_key),
            region: Some(self.region.clone()).filter(|r| !r.is_empty()),
        }
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.name.is_empty() {
            lines.push(format!("Name: {}", self.name));
        }
        if self.step > DraftStep::AccessKey || self.verifying {
            lines.push(format!("Access key: {}", self.access_key_id));
        }
        if self.verifying {
            lines.push("Verifying keys...".to_string());
        } else {
            let hint = if self.step == DraftStep::Region {
                " (optional)"
            } else {
                ""
            };
            lines.push(format!("{}{}:", self.step.label(), hint));
        }
        lines
    }
}

fn fmt_limit(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string())
}

/// Parse `"5"` or `"5!"` into (desired, widen limits).
pub fn parse_capacity(text: &str) -> Result<(i64, bool), String> {
    let t = text.trim();
    let (num, widen) = match t.strip_suffix('!') {
        Some(n) => (n.trim(), true),
        None => (t, false),
    };
    let desired: i64 = num
        .parse()
        .map_err(|_| format!("`{}` is not a number", num))?;
    if desired < 0 {
        return Err("capacity cannot be negative".to_string());
    }
    Ok((desired, widen))
}
