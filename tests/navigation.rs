use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context as _, Result};

use stratus::actions::ActionRequest;
use stratus::cache::CacheKey;
use stratus::error::CoreError;
use stratus::model::ContextOrigin;
use stratus::nav::{
    Dialog, DialogKind, DraftStep, ListScreen, Navigator, Notice, NoticeLevel, Screen,
};
use stratus::vault::EnvCredentials;

mod common;

use common::{FakeProbe, NavHarness, asg, instance, nav_harness, pump_until, security_group, wait_for};

fn top_list(nav: &Navigator) -> Option<&ListScreen> {
    match nav.top().map(|f| &f.screen) {
        Some(Screen::Resources(l)) => Some(l),
        _ => None,
    }
}

fn top_notice(nav: &Navigator) -> Option<Notice> {
    nav.top().and_then(|f| f.notice.clone())
}

fn loaded(nav: &Navigator) -> bool {
    top_list(nav).is_some_and(|l| !nav.list_view(l).records.is_empty())
}

/// Started navigator with prod active and the instance list on screen.
fn ready() -> Result<NavHarness> {
    let mut h = nav_harness(FakeProbe::with(&[]))?;
    h.cloud.set_list(
        "instances",
        vec![instance("i-1", "running"), instance("i-2", "stopped")],
    );
    h.nav.start();
    h.nav.activate_context("prod");
    pump_until(&mut h.nav, loaded)?;
    h.nav.clear_notice();
    Ok(h)
}

fn top_dialog(nav: &Navigator) -> Option<&Dialog> {
    match nav.top().map(|f| &f.screen) {
        Some(Screen::Dialog(d)) => Some(d),
        _ => None,
    }
}

fn enter(nav: &mut Navigator, text: &str) -> Result<()> {
    nav.top_dialog_mut().context("open dialog")?.input.set(text.into());
    nav.submit_dialog();
    Ok(())
}

fn env_source(name: &str, key: &str) -> EnvCredentials {
    let vars: HashMap<String, String> = [
        ("STRATUS_ACCESS_KEY_ID".to_string(), key.to_string()),
        ("STRATUS_SECRET_ACCESS_KEY".to_string(), "secret".to_string()),
    ]
    .into();
    EnvCredentials::with_lookup(name, move |k| vars.get(k).cloned())
}

#[test]
fn startup_without_a_default_opens_the_context_picker() -> Result<()> {
    let mut h = nav_harness(FakeProbe::with(&[]))?;
    h.nav.start();
    assert_eq!(h.nav.frames().len(), 1);
    match h.nav.top().map(|f| &f.screen) {
        Some(Screen::Contexts(p)) => assert_eq!(p.items, vec!["prod".to_string()]),
        other => panic!("expected the context picker, got {:?}", other),
    }
    assert!(h.nav.session().is_none());
    assert_eq!(h.nav.status_line(), "no active context");
    Ok(())
}

#[test]
fn kind_aliases_open_the_same_list() -> Result<()> {
    let mut h = ready()?;
    let key = top_list(&h.nav).context("root list")?.key.clone();

    for line in [":i", "instances", "ec2", "inst"] {
        h.nav.dispatch(line);
        let list = top_list(&h.nav).context("list after dispatch")?;
        assert_eq!(list.kind, "instances", "{}", line);
        assert_eq!(list.key, key, "{}", line);
        assert_eq!(h.nav.frames().len(), 1, "{}", line);
    }

    h.nav.dispatch("sg");
    assert_eq!(top_list(&h.nav).map(|l| l.kind), Some("security-groups"));
    assert_eq!(h.nav.frames().len(), 1);
    Ok(())
}

#[test]
fn unknown_command_reports_and_keeps_the_stack() -> Result<()> {
    let mut h = ready()?;
    let before = h.nav.frames().len();
    h.nav.dispatch("bogus");
    assert_eq!(h.nav.frames().len(), before);
    let notice = top_notice(&h.nav).context("notice")?;
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.text.contains("unknown command `bogus`"), "{}", notice.text);
    Ok(())
}

#[test]
fn filter_argument_narrows_the_list() -> Result<()> {
    let mut h = ready()?;
    h.nav.dispatch("instances i-2");
    let list = top_list(&h.nav).context("list")?;
    assert_eq!(list.filter, "i-2");
    let view = h.nav.list_view(list);
    assert_eq!(common::ids(&view.records), vec!["i-2"]);
    Ok(())
}

#[test]
fn session_dialogs_are_refused_without_a_session() -> Result<()> {
    let mut h = nav_harness(FakeProbe::with(&[]))?;
    h.nav.start();

    let dialog = Dialog::new(DialogKind::ConfirmAction {
        request: ActionRequest::new("instances", "stop", vec!["i-1".into()]),
        prompt: "Stop instances i-1?".into(),
    });
    assert_eq!(
        h.nav.push(Screen::Dialog(dialog)).err(),
        Some(CoreError::NoActiveSession)
    );
    assert_eq!(h.nav.frames().len(), 1);

    h.nav.dispatch("i");
    assert_eq!(h.nav.frames().len(), 1);
    let notice = top_notice(&h.nav).context("notice")?;
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.text.contains("no active session"));

    // Dialogs that do not act on resources still open.
    assert!(
        h.nav
            .push(Screen::Dialog(Dialog::new(DialogKind::ImportFile)))
            .is_ok()
    );
    Ok(())
}

#[test]
fn closing_a_list_unsubscribes_without_cancelling_its_refresh() -> Result<()> {
    let mut h = ready()?;
    h.cloud.set_list("security-groups", vec![security_group("sg-1")]);
    let session = h.nav.session().context("session")?;
    let sg_key = CacheKey::for_session(&session, "security-groups");

    h.cloud.hold_lists();
    h.nav.dispatch("help");
    h.nav.dispatch("sg");
    assert_eq!(h.nav.frames().len(), 3);
    h.cloud.wait_arrived(2)?;
    assert_eq!(h.nav.cache().snapshot(&sg_key).map(|s| s.subscribers), Some(1));

    assert!(h.nav.pop());
    assert_eq!(h.nav.cache().snapshot(&sg_key).map(|s| s.subscribers), Some(0));

    h.cloud.release_all();
    let cache = h.nav.cache().clone();
    wait_for(|| cache.snapshot(&sg_key).is_some_and(|s| s.has_data()))?;
    h.nav.pump();
    assert!(matches!(
        h.nav.top().map(|f| &f.screen),
        Some(Screen::Help { .. })
    ));
    Ok(())
}

#[test]
fn late_results_for_closed_screens_are_dropped() -> Result<()> {
    let mut h = ready()?;
    h.cloud.set_list("security-groups", vec![security_group("sg-1")]);
    let mut described = instance("i-1", "running");
    described["SecurityGroups"] = serde_json::json!([{"GroupId": "sg-1"}]);
    h.cloud.set_describe("i-1", described);
    let session = h.nav.session().context("session")?;
    let sg_key = CacheKey::for_session(&session, "security-groups");

    // The related view blocks on the security group list.
    h.cloud.hold_lists();
    h.nav.activate_selected();
    assert!(matches!(
        h.nav.top().map(|f| &f.screen),
        Some(Screen::Related(r)) if r.groups.is_none()
    ));
    h.cloud.wait_arrived(2)?;
    assert!(h.nav.pop());
    h.nav.dispatch("help");

    h.cloud.release_all();
    let cache = h.nav.cache().clone();
    wait_for(|| cache.snapshot(&sg_key).is_some_and(|s| s.has_data()))?;
    for _ in 0..20 {
        h.nav.pump();
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(h.nav.frames().len(), 2);
    assert!(
        h.nav
            .frames()
            .iter()
            .all(|f| !matches!(f.screen, Screen::Related(_)))
    );
    assert!(top_notice(&h.nav).is_none());
    Ok(())
}

#[test]
fn related_view_fills_in_when_resolved() -> Result<()> {
    let mut h = ready()?;
    h.cloud.set_list("security-groups", vec![security_group("sg-1")]);
    let mut described = instance("i-1", "running");
    described["SecurityGroups"] = serde_json::json!([{"GroupId": "sg-1"}, {"GroupId": "sg-gone"}]);
    h.cloud.set_describe("i-1", described);

    h.nav.activate_selected();
    pump_until(&mut h.nav, |nav| {
        matches!(nav.top().map(|f| &f.screen), Some(Screen::Related(r)) if r.groups.is_some())
    })?;
    let rows = match h.nav.top().map(|f| &f.screen) {
        Some(Screen::Related(r)) => r.rows(),
        _ => Vec::new(),
    };
    assert!(rows.contains(&("security-groups", "sg-1".to_string())));
    assert!(rows.contains(&("security-groups", "sg-gone".to_string())));

    // Enter on a related row describes it.
    h.nav.move_selection(-10);
    h.nav.activate_selected();
    assert!(matches!(
        h.nav.top().map(|f| &f.screen),
        Some(Screen::Describe(d)) if d.kind == "security-groups"
    ));
    Ok(())
}

#[test]
fn describe_shows_the_payload() -> Result<()> {
    let mut h = ready()?;
    h.cloud.set_describe("i-1", instance("i-1", "running"));
    h.nav.open_describe();
    pump_until(&mut h.nav, |nav| {
        matches!(nav.top().map(|f| &f.screen), Some(Screen::Describe(d)) if d.lines.is_some())
    })?;
    let lines = match h.nav.top().map(|f| &f.screen) {
        Some(Screen::Describe(d)) => d.lines.clone().unwrap_or_default(),
        _ => Vec::new(),
    };
    assert!(lines.iter().any(|l| l.contains("\"InstanceId\": \"i-1\"")));
    assert_eq!(h.cloud.describe_calls(), 1);
    Ok(())
}

#[test]
fn destructive_action_asks_then_runs_and_reloads() -> Result<()> {
    let mut h = ready()?;
    assert!(h.nav.action_hotkey('x'));
    assert!(matches!(
        h.nav.top().map(|f| &f.screen),
        Some(Screen::Dialog(d)) if matches!(d.kind, DialogKind::ConfirmAction { .. })
    ));
    assert!(h.cloud.acts().is_empty());

    h.nav.submit_dialog();
    pump_until(&mut h.nav, |nav| {
        top_notice(nav).is_some_and(|n| n.level == NoticeLevel::Success)
    })?;
    let acts = h.cloud.acts();
    assert_eq!(acts.len(), 1);
    assert_eq!((acts[0].0.as_str(), acts[0].1.as_str()), ("stop", "i-1"));

    let cloud = h.cloud.clone();
    wait_for(|| cloud.list_calls() >= 2)?;
    Ok(())
}

#[test]
fn failed_precondition_is_reported_without_a_dialog() -> Result<()> {
    let mut h = ready()?;
    assert!(h.nav.action_hotkey('s'));
    assert_eq!(h.nav.frames().len(), 1);
    let notice = top_notice(&h.nav).context("notice")?;
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.text.starts_with("cannot start"), "{}", notice.text);
    assert!(h.cloud.acts().is_empty());

    assert!(!h.nav.action_hotkey('?'));
    Ok(())
}

#[test]
fn scale_dialog_validates_before_calling_out() -> Result<()> {
    let mut h = ready()?;
    h.cloud.set_list("autoscaling-groups", vec![asg("web", 2, 1, 4)]);
    h.nav.dispatch("asg");
    pump_until(&mut h.nav, loaded)?;

    assert!(h.nav.action_hotkey('S'));
    let dialog = h.nav.top_dialog_mut().context("scale dialog")?;
    assert_eq!(dialog.input.text(), "2");

    dialog.input.set("nine".into());
    h.nav.submit_dialog();
    let err = h.nav.top_dialog_mut().and_then(|d| d.error.clone());
    assert!(err.is_some_and(|e| e.contains("not a number")));

    let dialog = h.nav.top_dialog_mut().context("scale dialog")?;
    dialog.input.set("9".into());
    h.nav.submit_dialog();
    let err = h.nav.top_dialog_mut().and_then(|d| d.error.clone());
    assert!(err.is_some_and(|e| e.contains("outside 1..4")));
    assert!(h.cloud.acts().is_empty());

    let dialog = h.nav.top_dialog_mut().context("scale dialog")?;
    dialog.input.set("9!".into());
    h.nav.submit_dialog();
    assert!(h.nav.top_dialog_mut().is_none());
    pump_until(&mut h.nav, |nav| {
        top_notice(nav).is_some_and(|n| n.level == NoticeLevel::Success)
    })?;
    assert_eq!(h.cloud.acts()[0].0, "set-desired-capacity");
    Ok(())
}

#[test]
fn connect_dialog_remembers_the_login_name() -> Result<()> {
    let mut h = ready()?;
    assert!(h.nav.action_hotkey('c'));
    let dialog = h.nav.top_dialog_mut().context("connect dialog")?;
    assert_eq!(dialog.input.text(), "ec2-user");
    dialog.input.set("ubuntu".into());
    h.nav.submit_dialog();
    pump_until(&mut h.nav, |nav| {
        top_notice(nav).is_some_and(|n| n.level == NoticeLevel::Success)
    })?;
    assert_eq!(h.nav.sessions().ssh_username_for("ops"), Some("ubuntu"));

    assert!(h.nav.action_hotkey('c'));
    let dialog = h.nav.top_dialog_mut().context("connect dialog")?;
    assert_eq!(dialog.input.text(), "ubuntu");
    Ok(())
}

#[test]
fn import_admits_probed_contexts() -> Result<()> {
    let mut h = nav_harness(FakeProbe::with(&[("AKSTAGING", "444455556666")]))?;
    h.nav.start();
    h.nav.start_import(Box::new(env_source("staging", "AKSTAGING")));
    pump_until(&mut h.nav, |nav| {
        top_notice(nav).is_some_and(|n| n.level == NoticeLevel::Success)
    })?;

    assert!(h.nav.sessions().vault().contains("staging"));
    assert_eq!(
        h.nav
            .sessions()
            .vault()
            .get("staging")
            .and_then(|c| c.account_id.as_deref()),
        Some("444455556666")
    );
    match h.nav.top().map(|f| &f.screen) {
        Some(Screen::Contexts(p)) => assert!(p.items.contains(&"staging".to_string())),
        other => panic!("expected the context picker, got {:?}", other),
    }
    Ok(())
}

#[test]
fn import_with_rejected_credentials_reports_why() -> Result<()> {
    let mut h = nav_harness(FakeProbe::with(&[]))?;
    h.nav.start();
    h.nav.start_import(Box::new(env_source("staging", "AKBAD")));
    pump_until(&mut h.nav, |nav| {
        top_notice(nav).is_some_and(|n| n.level == NoticeLevel::Error)
    })?;
    let notice = top_notice(&h.nav).context("notice")?;
    assert!(notice.text.contains("invalid client token"), "{}", notice.text);
    assert!(!h.nav.sessions().vault().contains("staging"));
    Ok(())
}

#[test]
fn region_switch_rebuilds_the_session_and_list() -> Result<()> {
    let mut h = ready()?;
    let before = h.nav.session().context("session")?;
    h.nav.dispatch("region eu-west-1");

    let after = h.nav.session().context("session")?;
    assert_eq!(after.region(), "eu-west-1");
    assert_eq!(after.context_name(), "prod");
    assert_ne!(after.id(), before.id());
    let list = top_list(&h.nav).context("list")?;
    assert_eq!(list.key.region, "eu-west-1");
    assert_eq!(list.kind, "instances");
    assert!(
        h.nav
            .cache()
            .snapshot(&CacheKey::for_session(&before, "instances"))
            .is_none()
    );
    Ok(())
}

#[test]
fn visible_list_is_rechecked_after_the_ttl() -> Result<()> {
    let mut h = ready()?;
    assert_eq!(h.cloud.list_calls(), 1);

    h.clock.advance(Duration::from_secs(5));
    h.nav.tick();
    assert_eq!(h.cloud.list_calls(), 1);

    h.clock.advance(Duration::from_secs(30));
    h.nav.tick();
    let cloud = h.cloud.clone();
    wait_for(|| cloud.list_calls() == 2)?;
    Ok(())
}

#[test]
fn failed_refresh_keeps_rows_and_warns() -> Result<()> {
    let mut h = ready()?;
    h.cloud.script_lists(vec![
        Err(stratus::remote::RemoteError::Transient("throttled".into())),
        Err(stratus::remote::RemoteError::Transient("throttled".into())),
        Err(stratus::remote::RemoteError::Transient("throttled".into())),
    ]);
    h.nav.refresh_current();
    pump_until(&mut h.nav, |nav| top_list(nav).is_some_and(|l| l.warning.is_some()))?;

    let list = top_list(&h.nav).context("list")?;
    assert_eq!(h.nav.list_view(list).records.len(), 2);
    let notice = top_notice(&h.nav).context("notice")?;
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.text.contains("throttled"));
    Ok(())
}

#[test]
fn deleting_the_active_context_returns_to_the_picker() -> Result<()> {
    let mut h = ready()?;
    h.nav.dispatch("context");
    assert!(matches!(
        h.nav.top().map(|f| &f.screen),
        Some(Screen::Contexts(_))
    ));
    h.nav.set_default_selected();
    assert_eq!(h.nav.sessions().defaults().context.as_deref(), Some("prod"));

    h.nav.delete_selected();
    h.nav.submit_dialog();

    assert!(h.nav.session().is_none());
    assert!(h.nav.cache().is_empty());
    assert!(h.nav.sessions().vault().is_empty());
    assert!(h.nav.sessions().defaults().context.is_none());
    assert_eq!(h.nav.frames().len(), 1);
    assert!(matches!(
        h.nav.top().map(|f| &f.screen),
        Some(Screen::Contexts(p)) if p.items.is_empty()
    ));
    Ok(())
}

#[test]
fn root_frame_is_never_popped() -> Result<()> {
    let mut h = ready()?;
    assert!(!h.nav.pop());
    assert_eq!(h.nav.frames().len(), 1);
    h.nav.dispatch("quit");
    assert!(h.nav.should_quit());
    Ok(())
}

#[test]
fn suggestions_rank_kinds_and_builtins() -> Result<()> {
    let h = nav_harness(Arc::new(FakeProbe::default()))?;
    let names: Vec<String> = h.nav.suggestions("sec").into_iter().map(|s| s.name).collect();
    assert_eq!(names.first().map(|s| s.as_str()), Some("securitygroups"));
    assert!(h.nav.suggestions("").len() <= 8);
    Ok(())
}

#[test]
fn add_context_dialog_verifies_keys_before_storing() -> Result<()> {
    let mut h = nav_harness(FakeProbe::with(&[("AKSTAGING", "444455556666")]))?;
    h.nav.start();
    h.nav.dispatch("add");
    assert!(matches!(
        top_dialog(&h.nav).map(|d| &d.kind),
        Some(DialogKind::AddContext(_))
    ));

    enter(&mut h.nav, "  ")?;
    let dialog = top_dialog(&h.nav).context("add dialog")?;
    assert_eq!(dialog.error.as_deref(), Some("name cannot be blank"));

    for text in ["staging", "AKWRONG", "s3cr3t", ""] {
        enter(&mut h.nav, text)?;
    }
    pump_until(&mut h.nav, |nav| top_dialog(nav).is_some_and(|d| d.error.is_some()))?;
    let dialog = top_dialog(&h.nav).context("add dialog after rejection")?;
    let error = dialog.error.clone().unwrap_or_default();
    assert!(error.contains("key verification failed"), "{}", error);
    assert!(error.contains("invalid client token"), "{}", error);
    match &dialog.kind {
        DialogKind::AddContext(draft) => {
            assert_eq!(draft.step, DraftStep::AccessKey);
            assert!(!draft.verifying);
        }
        other => panic!("expected the add dialog, got {:?}", other),
    }
    assert_eq!(dialog.input.text(), "AKWRONG");
    assert!(!h.nav.sessions().vault().contains("staging"));

    for text in ["AKSTAGING", "s3cr3t", "eu-west-1"] {
        enter(&mut h.nav, text)?;
    }
    pump_until(&mut h.nav, |nav| {
        top_notice(nav).is_some_and(|n| n.level == NoticeLevel::Success)
    })?;
    let notice = top_notice(&h.nav).context("notice")?;
    assert_eq!(notice.text, "added context staging");
    assert_eq!(h.nav.frames().len(), 1);

    let staging = h.nav.sessions().vault().get("staging").context("staging")?;
    assert_eq!(staging.account_id.as_deref(), Some("444455556666"));
    assert_eq!(staging.default_region.as_deref(), Some("eu-west-1"));
    assert_eq!(staging.origin, ContextOrigin::Manual);
    match h.nav.top().map(|f| &f.screen) {
        Some(Screen::Contexts(p)) => assert!(p.items.contains(&"staging".to_string())),
        other => panic!("expected the context picker, got {:?}", other),
    }
    Ok(())
}

#[test]
fn key_picker_selects_defaults_and_login_names() -> Result<()> {
    let mut h = ready()?;
    let ssh = h.dir.path().join("ssh");
    fs::create_dir_all(&ssh).context("create ssh dir")?;
    for name in ["id_ed25519", "id_ed25519.pub", "work.pem", "known_hosts", "config"] {
        fs::write(ssh.join(name), "key").context("write key file")?;
    }

    h.nav.dispatch("ssh");
    match h.nav.top().map(|f| &f.screen) {
        Some(Screen::Keys(p)) => {
            assert_eq!(p.items, vec!["id_ed25519".to_string(), "work.pem".to_string()])
        }
        other => panic!("expected the key picker, got {:?}", other),
    }

    h.nav.move_selection(1);
    h.nav.set_default_selected();
    assert_eq!(h.nav.sessions().defaults().ssh_key.as_deref(), Some("work.pem"));
    let notice = top_notice(&h.nav).context("notice")?;
    assert_eq!(notice.text, "default ssh key set to work.pem");

    h.nav.move_selection(-1);
    h.nav.activate_selected();
    assert_eq!(h.nav.ssh_key(), Some("id_ed25519"));

    h.nav.edit_key_username();
    assert_eq!(top_dialog(&h.nav).map(|d| d.input.text()), Some(""));
    enter(&mut h.nav, "admin")?;
    assert_eq!(h.nav.sessions().ssh_username_for("id_ed25519"), Some("admin"));
    assert!(matches!(h.nav.top().map(|f| &f.screen), Some(Screen::Keys(_))));

    assert!(h.nav.pop());
    assert!(h.nav.action_hotkey('c'));
    let dialog = top_dialog(&h.nav).context("connect dialog")?;
    match &dialog.kind {
        DialogKind::ConnectInput { key, .. } => assert_eq!(key.as_deref(), Some("id_ed25519")),
        other => panic!("expected the connect dialog, got {:?}", other),
    }
    assert_eq!(dialog.input.text(), "admin");
    Ok(())
}
