use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::Vault;
use crate::error::CoreError;
use crate::model::{Context, ContextOrigin, Credentials};
use crate::remote::IdentityProbe;

/// One context offered for import, not yet validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportCandidate {
    pub name: String,
    pub credentials: Credentials,
    pub region: Option<String>,
}

/// Supplies import candidates from somewhere outside the vault.
pub trait CredentialSource {
    fn label(&self) -> String;
    fn candidates(&self) -> Result<Vec<ImportCandidate>>;
}

/// Credentials taken from `STRATUS_ACCESS_KEY_ID` / `STRATUS_SECRET_ACCESS_KEY`
/// (plus optional `STRATUS_SESSION_TOKEN`, `STRATUS_REGION`).
pub struct EnvCredentials {
    name: String,
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvCredentials {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_lookup(name, |k| std::env::var(k).ok())
    }

    pub fn with_lookup(
        name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }
}

impl CredentialSource for EnvCredentials {
    fn label(&self) -> String {
        "environment".to_string()
    }

    fn candidates(&self) -> Result<Vec<ImportCandidate>> {
        let (Some(key_id), Some(secret)) = (
            self.var("STRATUS_ACCESS_KEY_ID"),
            self.var("STRATUS_SECRET_ACCESS_KEY"),
        ) else {
            return Ok(Vec::new());
        };
        let mut credentials = Credentials::new(key_id, secret);
        credentials.session_token = self.var("STRATUS_SESSION_TOKEN");
        Ok(vec![ImportCandidate {
            name: self.name.clone(),
            credentials,
            region: self.var("STRATUS_REGION"),
        }])
    }
}

#[derive(Deserialize)]
struct FileEntry {
    name: String,
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

/// A JSON array of `{name, access_key_id, secret_access_key, region}`.
pub struct JsonCredentialsFile {
    path: PathBuf,
}

impl JsonCredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for JsonCredentialsFile {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn candidates(&self) -> Result<Vec<ImportCandidate>> {
        let bytes = fs::read(&self.path)
            .with_context(|| format!("read credentials file {}", self.path.display()))?;
        let entries: Vec<FileEntry> =
            serde_json::from_slice(&bytes).context("parse credentials file")?;
        Ok(entries
            .into_iter()
            .map(|e| {
                let mut credentials = Credentials::new(e.access_key_id, e.secret_access_key);
                credentials.session_token = e.session_token;
                ImportCandidate {
                    name: e.name,
                    credentials,
                    region: e.region,
                }
            })
            .collect())
    }
}

/// A candidate together with the identity probe's verdict.
#[derive(Clone, Debug)]
pub struct ProbedCandidate {
    pub candidate: ImportCandidate,
    pub outcome: std::result::Result<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<String>,
    /// `(name, reason)`
    pub skipped: Vec<(String, String)>,
}

/// Probe every candidate. Blocking; run it off the foreground thread.
///
/// When several candidates share a name only the last one is probed; the
/// earlier ones come back as skipped.
pub fn probe_candidates(
    candidates: Vec<ImportCandidate>,
    probe: &dyn IdentityProbe,
) -> Vec<ProbedCandidate> {
    let mut seen = HashSet::new();
    let mut out: Vec<ProbedCandidate> = candidates
        .into_iter()
        .rev()
        .map(|candidate| {
            if !seen.insert(candidate.name.clone()) {
                return ProbedCandidate {
                    candidate,
                    outcome: Err("superseded by a later candidate with the same name".into()),
                };
            }
            let outcome = probe
                .probe(&candidate.credentials)
                .map_err(|e| format!("identity probe failed: {}", e));
            ProbedCandidate { candidate, outcome }
        })
        .collect();
    out.reverse();
    out
}

impl Vault {
    /// Admit the candidates whose probe succeeded, overwriting same-named
    /// contexts, and persist once.
    pub fn admit(&mut self, probed: Vec<ProbedCandidate>) -> Result<ImportReport, CoreError> {
        self.admit_as(probed, ContextOrigin::Imported)
    }

    /// As [`Vault::admit`], recording `origin` on every stored context.
    pub fn admit_as(
        &mut self,
        probed: Vec<ProbedCandidate>,
        origin: ContextOrigin,
    ) -> Result<ImportReport, CoreError> {
        let mut report = ImportReport::default();
        let mut batch = Vec::new();
        for p in probed {
            let name = p.candidate.name.clone();
            match p.outcome {
                Ok(account) => {
                    info!(context = %name, account = %account, ?origin, "admitting context");
                    let existing = self.get(&name);
                    let ssh_key = existing.and_then(|c| c.ssh_key.clone());
                    let default_region = p
                        .candidate
                        .region
                        .or_else(|| existing.and_then(|c| c.default_region.clone()));
                    batch.push(Context {
                        name: name.clone(),
                        credentials: p.candidate.credentials,
                        default_region,
                        ssh_key,
                        account_id: Some(account),
                        origin,
                    });
                    report.imported.push(name);
                }
                Err(reason) => {
                    warn!(context = %name, reason = %reason, "skipping import candidate");
                    report.skipped.push((name, reason));
                }
            }
        }
        if !batch.is_empty() {
            self.put_all(batch)?;
        }
        Ok(report)
    }

    /// Probe and admit in one blocking call.
    pub fn import(
        &mut self,
        candidates: Vec<ImportCandidate>,
        probe: &dyn IdentityProbe,
    ) -> Result<ImportReport, CoreError> {
        self.admit(probe_candidates(candidates, probe))
    }

    /// Verify one hand-entered context and store it, replacing any context
    /// of the same name. Nothing is stored when verification fails.
    pub fn add_verified(
        &mut self,
        candidate: ImportCandidate,
        probe: &dyn IdentityProbe,
    ) -> Result<Context, CoreError> {
        candidate.check_filled()?;
        let name = candidate.name.clone();
        let mut report =
            self.admit_as(probe_candidates(vec![candidate], probe), ContextOrigin::Manual)?;
        if let Some((_, reason)) = report.skipped.pop() {
            return Err(CoreError::action_failed(
                format!("add context {}", name),
                reason,
            ));
        }
        self.get(&name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("context", name))
    }
}

impl ImportCandidate {
    /// Blank names or keys are refused before any remote call.
    pub fn check_filled(&self) -> Result<(), CoreError> {
        let blank = if self.name.trim().is_empty() {
            Some("name")
        } else if self.credentials.access_key_id.trim().is_empty() {
            Some("access key")
        } else if self.credentials.secret_access_key.trim().is_empty() {
            Some("secret key")
        } else {
            None
        };
        match blank {
            Some(field) => Err(CoreError::precondition(
                "add context",
                format!("{} cannot be blank", field),
            )),
            None => Ok(()),
        }
    }
}
