use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use proptest::prelude::*;

use stratus::cache::{
    CacheEvent, CacheKey, EnsureFresh, EntryState, RefreshHandle, RefreshOutcome, SubscriberId,
};
use stratus::error::CoreError;
use stratus::remote::RemoteError;
use stratus::session::Session;

mod common;

use common::{Harness, harness, ids, instance, security_group};

const WAIT: Duration = Duration::from_secs(5);

fn prod(h: &mut Harness) -> Result<Arc<Session>> {
    Ok(h.sessions.activate("prod", "us-east-1")?)
}

fn started(ensure: EnsureFresh) -> Result<RefreshHandle> {
    match ensure {
        EnsureFresh::Started(h) => Ok(h),
        other => bail!("expected a started refresh, got {:?}", other),
    }
}

fn finish(handle: &RefreshHandle) -> Result<RefreshOutcome> {
    handle.wait_timeout(WAIT).context("refresh did not finish")
}

#[test]
fn concurrent_callers_share_one_refresh() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    h.cloud
        .set_list("instances", vec![instance("i-1", "running"), instance("i-2", "stopped")]);
    h.cloud.hold_lists();

    let results: Vec<EnsureFresh> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| s.spawn(|| h.cache.ensure_fresh(&session, "instances")))
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("caller thread panicked"))
            .collect::<Result<Vec<_>, CoreError>>()
    })?;

    let started_count = results
        .iter()
        .filter(|r| matches!(r, EnsureFresh::Started(_)))
        .count();
    let attached_count = results
        .iter()
        .filter(|r| matches!(r, EnsureFresh::Attached(_)))
        .count();
    assert_eq!(started_count, 1);
    assert_eq!(attached_count, 7);
    let tokens: Vec<u64> = results
        .iter()
        .filter_map(|r| r.handle().map(|h| h.token()))
        .collect();
    assert!(tokens.iter().all(|t| *t == tokens[0]));

    h.cloud.wait_arrived(1)?;
    h.cloud.release_all();
    for r in &results {
        let handle = r.handle().context("handle")?;
        assert_eq!(finish(handle)?, RefreshOutcome::Applied { records: 2 });
    }
    assert_eq!(h.cloud.list_calls(), 1);
    Ok(())
}

#[test]
fn later_refresh_wins_when_it_finishes_first() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud.script_lists(vec![
        Ok(vec![instance("i-a", "running")]),
        Ok(vec![instance("i-b", "running")]),
    ]);
    h.cloud.hold_lists();

    let first = h.cache.refresh(&session, "instances")?;
    h.cloud.wait_arrived(1)?;
    let second = h.cache.refresh(&session, "instances")?;
    h.cloud.wait_arrived(2)?;
    assert!(second.token() > first.token());

    h.cloud.release(1);
    assert_eq!(finish(&second)?, RefreshOutcome::Applied { records: 1 });
    h.cloud.release(0);
    assert_eq!(finish(&first)?, RefreshOutcome::Superseded);

    let snap = h.cache.snapshot(&key).context("entry")?;
    assert_eq!(ids(&snap.records), vec!["i-b"]);
    assert_eq!(snap.state, EntryState::Fresh);
    let updates = h
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e, CacheEvent::Updated { .. }))
        .count();
    assert_eq!(updates, 1);
    Ok(())
}

#[test]
fn earlier_success_cannot_undo_a_later_failure() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud.script_lists(vec![
        Ok(vec![instance("i-old", "running")]),
        Err(RemoteError::Failed("denied".into())),
    ]);
    h.cloud.hold_lists();

    let first = h.cache.refresh(&session, "instances")?;
    h.cloud.wait_arrived(1)?;
    let second = h.cache.refresh(&session, "instances")?;
    h.cloud.wait_arrived(2)?;

    h.cloud.release(1);
    assert!(matches!(finish(&second)?, RefreshOutcome::Failed(_)));
    h.cloud.release(0);
    assert_eq!(finish(&first)?, RefreshOutcome::Superseded);

    let snap = h.cache.snapshot(&key).context("entry")?;
    assert!(snap.records.is_empty());
    assert!(snap.error.is_some());
    Ok(())
}

#[test]
fn refreshes_finishing_in_order_both_apply() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud.script_lists(vec![
        Ok(vec![instance("i-a", "running")]),
        Ok(vec![instance("i-b", "running")]),
    ]);
    h.cloud.hold_lists();

    let first = h.cache.refresh(&session, "instances")?;
    h.cloud.wait_arrived(1)?;
    let second = h.cache.refresh(&session, "instances")?;
    h.cloud.wait_arrived(2)?;

    h.cloud.release(0);
    assert_eq!(finish(&first)?, RefreshOutcome::Applied { records: 1 });
    h.cloud.release(1);
    assert_eq!(finish(&second)?, RefreshOutcome::Applied { records: 1 });
    assert_eq!(ids(&h.cache.get(&key).records), vec!["i-b"]);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    #[test]
    fn any_number_of_callers_makes_one_list_call(callers in 2usize..8) {
        let mut h = harness().unwrap();
        let session = prod(&mut h).unwrap();
        h.cloud.set_list("instances", vec![instance("i-1", "running")]);
        h.cloud.hold_lists();

        let results: Vec<EnsureFresh> = thread::scope(|s| {
            let workers: Vec<_> = (0..callers)
                .map(|_| s.spawn(|| h.cache.ensure_fresh(&session, "instances")))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap().unwrap()).collect()
        });
        h.cloud.wait_arrived(1).unwrap();
        h.cloud.release_all();
        for r in &results {
            finish(r.handle().unwrap()).unwrap();
        }
        prop_assert_eq!(h.cloud.list_calls(), 1);
    }

    #[test]
    fn last_started_refresh_wins_in_any_completion_order(
        order in Just((0..4usize).collect::<Vec<_>>()).prop_shuffle(),
        fails in prop::collection::vec(any::<bool>(), 4),
    ) {
        let mut h = harness().unwrap();
        let session = prod(&mut h).unwrap();
        let key = CacheKey::for_session(&session, "instances");
        h.cloud.script_lists(
            (0..order.len())
                .map(|i| {
                    if fails[i] {
                        Err(RemoteError::Failed(format!("denied {}", i)))
                    } else {
                        Ok(vec![instance(&format!("i-{}", i), "running")])
                    }
                })
                .collect(),
        );
        h.cloud.hold_lists();

        let mut handles = Vec::new();
        for i in 0..order.len() {
            handles.push(h.cache.refresh(&session, "instances").unwrap());
            h.cloud.wait_arrived(i + 1).unwrap();
        }
        let last = handles.len() - 1;
        let mut last_landed = false;
        for &n in &order {
            h.cloud.release(n);
            let outcome = finish(&handles[n]).unwrap();
            if last_landed {
                prop_assert_eq!(outcome, RefreshOutcome::Superseded);
            }
            last_landed |= n == last;
        }

        let snap = h.cache.snapshot(&key).unwrap();
        if fails[last] {
            prop_assert!(matches!(finish(&handles[last]).unwrap(), RefreshOutcome::Failed(_)));
            prop_assert!(snap.error.is_some());
        } else {
            prop_assert_eq!(
                finish(&handles[last]).unwrap(),
                RefreshOutcome::Applied { records: 1 }
            );
            prop_assert!(snap.error.is_none());
            prop_assert_eq!(ids(&snap.records), vec![format!("i-{}", last)]);
        }
    }
}

#[test]
fn entries_go_stale_after_the_ttl() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud.set_list("instances", vec![instance("i-1", "running")]);

    assert_eq!(h.cache.get(&key).state, EntryState::Empty);
    let first = started(h.cache.ensure_fresh(&session, "instances")?)?;
    assert_eq!(finish(&first)?, RefreshOutcome::Applied { records: 1 });

    h.clock.set(Duration::from_secs(10));
    assert_eq!(h.cache.state(&key), Some(EntryState::Fresh));
    assert!(matches!(
        h.cache.ensure_fresh(&session, "instances")?,
        EnsureFresh::Fresh
    ));
    assert_eq!(h.cloud.list_calls(), 1);

    h.clock.set(Duration::from_secs(40));
    assert_eq!(h.cache.state(&key), Some(EntryState::Stale));
    let again = started(h.cache.ensure_fresh(&session, "instances")?)?;
    assert_eq!(finish(&again)?, RefreshOutcome::Applied { records: 1 });
    assert_eq!(h.cloud.list_calls(), 2);
    Ok(())
}

#[test]
fn failed_refresh_keeps_the_last_good_records() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud
        .set_list("instances", vec![instance("i-1", "running"), instance("i-2", "running")]);
    let first = started(h.cache.ensure_fresh(&session, "instances")?)?;
    finish(&first)?;

    h.cloud.script_lists(vec![
        Err(RemoteError::Transient("throttled".into())),
        Err(RemoteError::Transient("throttled".into())),
        Err(RemoteError::Transient("throttled".into())),
    ]);
    h.clock.advance(Duration::from_secs(31));
    let failing = started(h.cache.ensure_fresh(&session, "instances")?)?;
    assert_eq!(
        finish(&failing)?,
        RefreshOutcome::Failed(CoreError::TransientRemoteFailure("throttled".into()))
    );
    // One initial load plus three attempts.
    assert_eq!(h.cloud.list_calls(), 4);

    let snap = h.cache.snapshot(&key).context("entry")?;
    assert_eq!(snap.state, EntryState::Errored);
    assert!(snap.is_stale());
    assert_eq!(ids(&snap.records), vec!["i-1", "i-2"]);
    assert!(snap.error.is_some());
    assert!(
        h.events
            .lock()
            .iter()
            .any(|e| matches!(e, CacheEvent::Failed { key: k, .. } if *k == key))
    );
    Ok(())
}

#[test]
fn non_transient_failures_are_not_retried() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    h.cloud
        .script_lists(vec![Err(RemoteError::Failed("access denied".into()))]);
    let handle = started(h.cache.ensure_fresh(&session, "instances")?)?;
    assert!(matches!(
        finish(&handle)?,
        RefreshOutcome::Failed(CoreError::RemoteActionFailure { .. })
    ));
    assert_eq!(h.cloud.list_calls(), 1);
    Ok(())
}

#[test]
fn invalidation_during_a_refresh_forces_a_new_one() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud.set_list("instances", vec![instance("i-1", "running")]);
    h.cloud.hold_lists();

    let first = started(h.cache.ensure_fresh(&session, "instances")?)?;
    h.cloud.wait_arrived(1)?;
    h.cache.invalidate(&key);
    let second = started(h.cache.ensure_fresh(&session, "instances")?)?;
    assert!(second.token() > first.token());

    h.cloud.wait_arrived(2)?;
    h.cloud.release_all();
    finish(&first)?;
    finish(&second)?;
    assert_eq!(h.cache.state(&key), Some(EntryState::Fresh));
    assert_eq!(h.cloud.list_calls(), 2);
    Ok(())
}

#[test]
fn clearing_discards_refreshes_in_flight() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    h.cloud.hold_lists();
    let handle = started(h.cache.ensure_fresh(&session, "instances")?)?;
    h.cloud.wait_arrived(1)?;

    h.cache.clear();
    h.cloud.release_all();
    assert_eq!(finish(&handle)?, RefreshOutcome::Discarded);
    assert!(h.cache.is_empty());
    Ok(())
}

#[test]
fn idle_entries_are_evicted_after_the_window() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let watched = CacheKey::for_session(&session, "volumes");
    let dropped = CacheKey::for_session(&session, "instances");

    h.cache.subscribe(&watched, SubscriberId(1));
    h.cache.subscribe(&dropped, SubscriberId(2));
    let handle = started(h.cache.ensure_fresh(&session, "instances")?)?;
    finish(&handle)?;
    h.cache.unsubscribe(&dropped, SubscriberId(2));

    h.clock.advance(Duration::from_secs(30));
    assert_eq!(h.cache.evict_idle(), 0);

    h.clock.advance(Duration::from_secs(31));
    assert_eq!(h.cache.evict_idle(), 1);
    assert!(h.cache.snapshot(&dropped).is_none());
    assert_eq!(
        h.cache.snapshot(&watched).map(|s| s.subscribers),
        Some(1)
    );
    assert!(
        h.events
            .lock()
            .contains(&CacheEvent::Evicted { key: dropped.clone() })
    );
    Ok(())
}

#[test]
fn relations_describe_the_source_once() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let key = CacheKey::for_session(&session, "instances");
    h.cloud.set_list("instances", vec![instance("i-1", "running")]);
    h.cloud.set_list(
        "security-groups",
        vec![security_group("sg-1"), security_group("sg-9")],
    );
    let mut described = instance("i-1", "running");
    described["SecurityGroups"] = serde_json::json!([{"GroupId": "sg-1"}, {"GroupId": "sg-2"}]);
    described["VpcId"] = serde_json::json!("vpc-1");
    h.cloud.set_describe("i-1", described);

    let handle = started(h.cache.ensure_fresh(&session, "instances")?)?;
    finish(&handle)?;
    let record = h.cache.record(&key, "i-1").context("i-1 cached")?;
    assert!(record.raw.is_none());

    let groups = h
        .cache
        .resolve_relation(&session, "instances", &record, "security-groups")?;
    assert_eq!(ids(&groups), vec!["sg-1"]);
    assert_eq!(h.cloud.describe_calls(), 1);

    // The describe payload now lives on the cached record.
    let record = h.cache.record(&key, "i-1").context("i-1 cached")?;
    assert!(record.raw.is_some());
    let again = h
        .cache
        .resolve_relation(&session, "instances", &record, "security-groups")?;
    assert_eq!(ids(&again), vec!["sg-1"]);
    assert_eq!(h.cloud.describe_calls(), 1);

    let related = h.cache.related(&session, "instances", &record)?;
    let sgs = related
        .iter()
        .find(|g| g.target == "security-groups")
        .context("security group relation")?;
    assert_eq!(ids(&sgs.records), vec!["sg-1"]);
    assert_eq!(sgs.missing, vec!["sg-2".to_string()]);
    let vpc = related
        .iter()
        .find(|g| g.target == "vpcs")
        .context("vpc relation")?;
    assert!(vpc.records.is_empty());
    assert_eq!(vpc.missing, vec!["vpc-1".to_string()]);
    assert_eq!(h.cloud.describe_calls(), 1);
    Ok(())
}

#[test]
fn unknown_relation_is_not_found() -> Result<()> {
    let mut h = harness()?;
    let session = prod(&mut h)?;
    let record = stratus::model::ResourceRecord::new("i-1");
    let err = h
        .cache
        .resolve_relation(&session, "instances", &record, "target-groups")
        .err();
    assert!(matches!(err, Some(CoreError::NotFound { .. })));
    assert_eq!(h.cloud.describe_calls(), 0);
    Ok(())
}

#[test]
fn sessions_never_share_entries() -> Result<()> {
    let mut h = harness()?;
    h.cloud.set_list("instances", vec![instance("i-1", "running")]);
    let prod = prod(&mut h)?;
    let handle = started(h.cache.ensure_fresh(&prod, "instances")?)?;
    finish(&handle)?;

    let dev = h.sessions.activate("dev", "us-east-1")?;
    assert_ne!(
        CacheKey::for_session(&prod, "instances"),
        CacheKey::for_session(&dev, "instances")
    );
    assert!(matches!(
        h.cache.ensure_fresh(&dev, "instances")?,
        EnsureFresh::Started(_)
    ));
    Ok(())
}
