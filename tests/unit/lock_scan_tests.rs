use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use town_identity::config::IdentityConfig;
use town_identity::lock::liveness::current_pid;
use town_identity::lock::{
    clean_stale_locks, detect_collisions, find_all_locks, LockFinding, SessionProbe,
};
use town_identity::models::LockRecord;

const DEAD_PID: i64 = 999_999_999;

struct FakeProbe(HashSet<String>);

impl FakeProbe {
    fn with(sessions: &[&str]) -> Self {
        Self(sessions.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl SessionProbe for FakeProbe {
    fn live_sessions(&self) -> HashSet<String> {
        self.0.clone()
    }
}

fn seed(root: &Path, rel: &str, pid: i64, session: &str) -> PathBuf {
    let dir = root.join(rel);
    let path = IdentityConfig::default().lock_path_in(&dir);
    fs::create_dir_all(path.parent().expect("runtime dir")).expect("mkdir");
    let record = LockRecord::new(pid, session, None);
    fs::write(&path, serde_json::to_vec(&record).expect("serialize")).expect("write lock");
    dir
}

#[test]
fn finds_locks_at_any_depth() {
    let temp = tempfile::tempdir().expect("tempdir");
    let crew = seed(temp.path(), "gastown/crew/max", current_pid(), "s1");
    let polecat = seed(temp.path(), "beads/polecats/toast", DEAD_PID, "s2");

    let locks = find_all_locks(temp.path(), &IdentityConfig::default()).expect("scan");

    assert_eq!(locks.len(), 2);
    assert_eq!(locks[&crew].session_id, "s1");
    assert_eq!(locks[&polecat].pid, DEAD_PID);
}

#[test]
fn corrupt_locks_are_skipped() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path(), "gastown/crew/max", current_pid(), "s1");
    let bad = IdentityConfig::default().lock_path_in(&temp.path().join("gastown/crew/joe"));
    fs::create_dir_all(bad.parent().expect("runtime dir")).expect("mkdir");
    fs::write(&bad, "nonsense").expect("write");

    let locks = find_all_locks(temp.path(), &IdentityConfig::default()).expect("scan");
    assert_eq!(locks.len(), 1);
}

#[test]
fn empty_town_has_no_locks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let locks = find_all_locks(temp.path(), &IdentityConfig::default()).expect("scan");
    assert!(locks.is_empty());
}

#[test]
fn clean_removes_only_dead_locks_without_live_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = IdentityConfig::default();
    let live = seed(temp.path(), "gastown/crew/max", current_pid(), "s-live");
    let restarting = seed(temp.path(), "gastown/crew/joe", DEAD_PID, "$7");
    let dead = seed(temp.path(), "gastown/polecats/toast", DEAD_PID, "s-gone");
    let anonymous = seed(temp.path(), "beads/polecats/nux", DEAD_PID, "");

    let cleaned = clean_stale_locks(temp.path(), &config, &FakeProbe::with(&["$7"]))
        .expect("clean");

    assert_eq!(cleaned, 2);
    assert!(config.lock_path_in(&live).exists());
    assert!(config.lock_path_in(&restarting).exists());
    assert!(!config.lock_path_in(&dead).exists());
    assert!(!config.lock_path_in(&anonymous).exists());
}

#[test]
fn collisions_report_stale_and_orphaned_locks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let healthy = seed(temp.path(), "gastown/crew/max", current_pid(), "s-live");
    let orphan = seed(temp.path(), "gastown/crew/joe", current_pid(), "s-gone");
    let stale = seed(temp.path(), "gastown/polecats/toast", DEAD_PID, "s-live");

    let live: HashSet<String> = ["s-live".to_owned()].into_iter().collect();
    let findings =
        detect_collisions(temp.path(), &IdentityConfig::default(), &live).expect("scan");

    assert_eq!(findings.len(), 2);
    assert!(findings.iter().all(|f| f.identity_dir() != healthy));
    assert!(findings.iter().any(|f| matches!(
        f,
        LockFinding::Orphaned { identity_dir, .. } if *identity_dir == orphan
    )));
    assert!(findings.iter().any(|f| matches!(
        f,
        LockFinding::Stale { identity_dir, .. } if *identity_dir == stale
    )));
}

#[test]
fn findings_render_for_operators() {
    let stale = LockFinding::Stale {
        identity_dir: PathBuf::from("/town/gastown/crew/max"),
        record: LockRecord::new(DEAD_PID, "s1", None),
    };
    assert_eq!(
        stale.to_string(),
        format!("stale lock in /town/gastown/crew/max (dead PID {DEAD_PID}, session s1)")
    );

    let orphaned = LockFinding::Orphaned {
        identity_dir: PathBuf::from("/town/gastown/crew/joe"),
        record: LockRecord::new(42, "s2", None),
    };
    assert_eq!(
        orphaned.to_string(),
        "orphaned lock in /town/gastown/crew/joe (session s2 not found, PID 42 still alive)"
    );
}

#[cfg(unix)]
#[test]
fn symlinked_directories_do_not_duplicate_locks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = IdentityConfig::default();
    let nova = seed(temp.path(), "gastown/polecats/nova", DEAD_PID, "s-gone");
    std::os::unix::fs::symlink(temp.path().join("gastown"), temp.path().join("alias"))
        .expect("symlink");

    let locks = find_all_locks(temp.path(), &config).expect("scan");
    assert_eq!(locks.keys().collect::<Vec<_>>(), [&nova]);

    let findings = detect_collisions(temp.path(), &config, &HashSet::new()).expect("scan");
    assert_eq!(findings.len(), 1);

    let cleaned = clean_stale_locks(temp.path(), &config, &FakeProbe::with(&[])).expect("clean");
    assert_eq!(cleaned, 1);
    assert!(!config.lock_path_in(&nova).exists());
}
