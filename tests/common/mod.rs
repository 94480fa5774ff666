#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use parking_lot::{Condvar, Mutex};
use serde_json::{Value, json};

use stratus::cache::{
    CacheEngine, CacheEvent, CacheSettings, ManualClock, RetryPolicy, Workers,
};
use stratus::model::{Context, Credentials, Defaults, KindId, Payload};
use stratus::nav::{self, NavConfig, Navigator};
use stratus::registry::Registry;
use stratus::remote::{ClientFactory, IdentityProbe, RemoteError, ResourceClient, ServiceKind};
use stratus::session::SessionManager;
use stratus::vault::{KdfParams, Vault};

pub fn weak_kdf() -> KdfParams {
    KdfParams {
        m_cost: 8,
        t_cost: 1,
        p_cost: 1,
    }
}

#[derive(Default)]
struct Gate {
    held: bool,
    arrived: usize,
    released: HashSet<usize>,
}

/// In-memory cloud. List calls can be held at a gate and released one by
/// one; responses and failures can be scripted per call.
#[derive(Default)]
pub struct FakeCloud {
    lists: Mutex<HashMap<KindId, Vec<Payload>>>,
    scripted: Mutex<VecDeque<Result<Vec<Payload>, RemoteError>>>,
    describes: Mutex<HashMap<String, Payload>>,
    act_failures: Mutex<HashMap<String, RemoteError>>,
    latency: Mutex<Duration>,
    gate: Mutex<Gate>,
    gate_cv: Condvar,
    list_calls: AtomicUsize,
    describe_calls: AtomicUsize,
    acts: Mutex<Vec<(String, String, Payload)>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_list(&self, kind: KindId, items: Vec<Payload>) {
        self.lists.lock().insert(kind, items);
    }

    /// The next list calls return these, in arrival order.
    pub fn script_lists(&self, results: Vec<Result<Vec<Payload>, RemoteError>>) {
        self.scripted.lock().extend(results);
    }

    pub fn set_describe(&self, id: &str, payload: Payload) {
        self.describes.lock().insert(id.to_string(), payload);
    }

    pub fn fail_step(&self, step: &str, err: RemoteError) {
        self.act_failures.lock().insert(step.to_string(), err);
    }

    pub fn set_latency(&self, d: Duration) {
        *self.latency.lock() = d;
    }

    pub fn hold_lists(&self) {
        self.gate.lock().held = true;
    }

    /// Let the `n`th list call (0-based, by arrival) return.
    pub fn release(&self, n: usize) {
        self.gate.lock().released.insert(n);
        self.gate_cv.notify_all();
    }

    pub fn release_all(&self) {
        self.gate.lock().held = false;
        self.gate_cv.notify_all();
    }

    /// Block until `n` list calls have arrived.
    pub fn wait_arrived(&self, n: usize) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut g = self.gate.lock();
        while g.arrived < n {
            if self.gate_cv.wait_until(&mut g, deadline).timed_out() {
                anyhow::bail!("only {} of {} list calls arrived", g.arrived, n);
            }
        }
        Ok(())
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn acts(&self) -> Vec<(String, String, Payload)> {
        self.acts.lock().clone()
    }
}

impl ResourceClient for FakeCloud {
    fn list(&self, kind: KindId, _region: &str) -> Result<Vec<Payload>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripted.lock().pop_front();
        {
            let mut g = self.gate.lock();
            let n = g.arrived;
            g.arrived += 1;
            self.gate_cv.notify_all();
            while g.held && !g.released.contains(&n) {
                self.gate_cv.wait(&mut g);
            }
        }
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        match scripted {
            Some(r) => r,
            None => Ok(self.lists.lock().get(kind).cloned().unwrap_or_default()),
        }
    }

    fn describe(&self, _kind: KindId, _region: &str, id: &str) -> Result<Payload, RemoteError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.describes
            .lock()
            .get(id)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    fn act(
        &self,
        _kind: KindId,
        _region: &str,
        action: &str,
        id: &str,
        params: &Payload,
    ) -> Result<Payload, RemoteError> {
        self.acts
            .lock()
            .push((action.to_string(), id.to_string(), params.clone()));
        match self.act_failures.lock().get(action) {
            Some(err) => Err(err.clone()),
            None => Ok(json!({"ok": true})),
        }
    }
}

/// Hands every service the same fake cloud.
pub struct FakeFactory {
    pub cloud: Arc<FakeCloud>,
    pub connects: AtomicUsize,
}

impl FakeFactory {
    pub fn new(cloud: Arc<FakeCloud>) -> Arc<Self> {
        Arc::new(Self {
            cloud,
            connects: AtomicUsize::new(0),
        })
    }
}

impl ClientFactory for FakeFactory {
    fn connect(
        &self,
        _service: ServiceKind,
        _credentials: &Credentials,
        _region: &str,
    ) -> Result<Arc<dyn ResourceClient>, RemoteError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.cloud.clone())
    }
}

/// Maps access key ids to accounts; unknown keys fail.
#[derive(Default)]
pub struct FakeProbe {
    accounts: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn with(pairs: &[(&str, &str)]) -> Arc<Self> {
        let probe = Self::default();
        for (key, account) in pairs {
            probe
                .accounts
                .lock()
                .insert(key.to_string(), account.to_string());
        }
        Arc::new(probe)
    }
}

impl IdentityProbe for FakeProbe {
    fn probe(&self, credentials: &Credentials) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.accounts
            .lock()
            .get(&credentials.access_key_id)
            .cloned()
            .ok_or_else(|| RemoteError::Failed("invalid client token".into()))
    }
}

pub fn instance(id: &str, state: &str) -> Payload {
    json!({
        "InstanceId": id,
        "State": {"Name": state},
        "InstanceType": "t3.micro",
        "PublicIpAddress": "203.0.113.10",
        "KeyName": "ops",
        "Tags": [{"Key": "Name", "Value": format!("web-{}", id)}],
    })
}

pub fn security_group(id: &str) -> Payload {
    json!({"GroupId": id, "GroupName": format!("sg-name-{}", id), "VpcId": "vpc-1"})
}

pub fn asg(name: &str, desired: i64, min: i64, max: i64) -> Payload {
    json!({
        "AutoScalingGroupName": name,
        "DesiredCapacity": desired,
        "MinSize": min,
        "MaxSize": max,
    })
}

pub fn volume(id: &str, state: &str) -> Payload {
    json!({"VolumeId": id, "State": state, "Size": 8})
}

/// A vault, session manager and cache over a fake cloud, with a manual
/// clock and zero-backoff retries.
pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub factory: Arc<FakeFactory>,
    pub clock: Arc<ManualClock>,
    pub cache: CacheEngine,
    pub sessions: SessionManager,
    pub events: Arc<Mutex<Vec<CacheEvent>>>,
    pub dir: tempfile::TempDir,
    pub workers: Workers,
}

pub fn settings(ttl: Duration) -> CacheSettings {
    CacheSettings {
        ttl,
        idle_window: Duration::from_secs(60),
        retry: RetryPolicy::immediate(3),
    }
}

pub fn open_vault(dir: &std::path::Path) -> Result<Vault> {
    Ok(Vault::open_with_params(
        &dir.join("vault.json"),
        "hunter2",
        weak_kdf(),
    )?)
}

pub fn harness_with(settings: CacheSettings) -> Result<Harness> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut vault = open_vault(dir.path())?;
    vault.put(Context::manual("prod", Credentials::new("AKPROD", "secret")))?;
    vault.put(Context::manual("dev", Credentials::new("AKDEV", "secret")))?;

    let cloud = FakeCloud::new();
    let factory = FakeFactory::new(cloud.clone());
    let clock = Arc::new(ManualClock::new());
    let workers = Workers::start()?;
    let events: Arc<Mutex<Vec<CacheEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let cache = CacheEngine::builder(Registry::builtin(), workers.spawner())
        .settings(settings)
        .clock(clock.clone())
        .events(Arc::new(move |ev: CacheEvent| sink.lock().push(ev)))
        .build();
    let sessions = SessionManager::new(
        vault,
        Defaults::default(),
        None,
        factory.clone(),
        "us-east-1",
    );
    Ok(Harness {
        cloud,
        factory,
        clock,
        cache,
        sessions,
        events,
        dir,
        workers,
    })
}

pub fn harness() -> Result<Harness> {
    harness_with(settings(Duration::from_secs(30)))
}

/// A navigator over a fake cloud. The cache's events feed the navigator's
/// queue, as in the real shell.
pub struct NavHarness {
    pub cloud: Arc<FakeCloud>,
    pub clock: Arc<ManualClock>,
    pub nav: Navigator,
    pub dir: tempfile::TempDir,
    pub workers: Workers,
}

pub fn nav_harness(probe: Arc<dyn IdentityProbe>) -> Result<NavHarness> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut vault = open_vault(dir.path())?;
    vault.put(Context::manual("prod", Credentials::new("AKPROD", "secret")))?;

    let cloud = FakeCloud::new();
    let factory = FakeFactory::new(cloud.clone());
    let clock = Arc::new(ManualClock::new());
    let workers = Workers::start()?;
    let (tx, rx) = nav::channel();
    let cache = CacheEngine::builder(Registry::builtin(), workers.spawner())
        .settings(settings(Duration::from_secs(30)))
        .clock(clock.clone())
        .events(nav::cache_sink(tx.clone()))
        .build();
    let sessions = SessionManager::new(vault, Defaults::default(), None, factory, "us-east-1");
    let nav = Navigator::new(
        sessions,
        cache,
        probe,
        NavConfig {
            regions: vec!["us-east-1".into(), "eu-west-1".into()],
            recheck: Duration::from_secs(1),
            evict_every: Duration::from_secs(30),
            ssh_dir: Some(dir.path().join("ssh")),
        },
        (tx, rx),
    );
    Ok(NavHarness {
        cloud,
        clock,
        nav,
        dir,
        workers,
    })
}

/// Pump the navigator until `done` holds or five seconds pass.
pub fn pump_until(nav: &mut Navigator, mut done: impl FnMut(&Navigator) -> bool) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        nav.pump();
        if done(nav) {
            return Ok(());
        }
        if Instant::now() > deadline {
            anyhow::bail!("condition not reached");
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Poll `f` until it holds or five seconds pass.
pub fn wait_for(mut f: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !f() {
        if Instant::now() > deadline {
            anyhow::bail!("condition not reached");
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

pub fn ids(records: &[stratus::model::ResourceRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

pub fn text(v: &Value) -> String {
    v.as_str().unwrap_or_default().to_string()
}
