//! Acquire, release, and inspect a single identity lock on disk.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use town_identity::config::IdentityConfig;
use town_identity::lock::liveness::current_pid;
use town_identity::lock::{IdentityLock, LockStatus};
use town_identity::models::LockRecord;
use town_identity::AppError;

/// Far above any platform PID limit, so never alive.
const DEAD_PID: i64 = 999_999_999;

fn seed_lock(dir: &Path, record: &LockRecord) {
    let config = IdentityConfig::default();
    let path = config.lock_path_in(dir);
    fs::create_dir_all(path.parent().expect("runtime dir")).expect("mkdir");
    fs::write(&path, serde_json::to_vec(record).expect("serialize")).expect("write lock");
}

fn seed_raw(dir: &Path, body: &str) {
    let config = IdentityConfig::default();
    let path = config.lock_path_in(dir);
    fs::create_dir_all(path.parent().expect("runtime dir")).expect("mkdir");
    fs::write(&path, body).expect("write lock");
}

#[test]
fn acquire_on_empty_directory_writes_record() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    let record = lock.acquire("sess-1").expect("acquired");

    assert_eq!(record.pid, current_pid());
    assert_eq!(record.session_id, "sess-1");
    assert!(lock.lock_path().exists());
    assert_eq!(lock.read().expect("readable"), record);
}

#[test]
fn reacquire_by_same_process_refreshes_record() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    lock.acquire("first").expect("first acquire");
    let second = lock.acquire("second").expect("second acquire");

    assert_eq!(second.session_id, "second");
    assert_eq!(lock.read().expect("readable").session_id, "second");
}

#[test]
fn stale_lock_is_reclaimed() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_lock(temp.path(), &LockRecord::new(DEAD_PID, "old", None));
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    let record = lock.acquire("new").expect("stale lock reclaimed");

    assert_eq!(record.pid, current_pid());
    assert_eq!(lock.read().expect("readable").session_id, "new");
}

#[test]
fn corrupt_lock_is_reclaimed() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_raw(temp.path(), "not json at all");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    assert!(matches!(lock.read(), Err(AppError::InvalidLock(_))));
    lock.acquire("fresh").expect("corrupt lock replaced");
    assert_eq!(lock.read().expect("readable").session_id, "fresh");
}

#[test]
fn missing_lock_reads_as_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());
    assert!(lock.read().expect_err("absent").is_not_found());
}

#[test]
fn status_reports_each_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    assert_eq!(lock.status(), LockStatus::Unlocked);
    assert_eq!(lock.status().to_string(), "unlocked");

    lock.acquire("mine").expect("acquired");
    assert!(matches!(lock.status(), LockStatus::HeldBySelf(_)));
    assert_eq!(lock.status().to_string(), "locked (by us)");

    seed_lock(temp.path(), &LockRecord::new(DEAD_PID, "gone", None));
    assert!(matches!(lock.status(), LockStatus::Stale(_)));
    assert_eq!(lock.status().to_string(), format!("stale (dead PID {DEAD_PID})"));

    seed_raw(temp.path(), "{");
    assert!(matches!(lock.status(), LockStatus::Invalid(_)));
    assert!(lock.status().to_string().starts_with("error: "));
}

#[test]
fn release_removes_own_lock_and_tolerates_absence() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    lock.release().expect("absent lock releases");
    lock.acquire("mine").expect("acquired");
    lock.release().expect("own lock releases");

    assert!(!lock.lock_path().exists());
    assert_eq!(lock.status(), LockStatus::Unlocked);
}

#[test]
fn release_removes_stale_lock() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_lock(temp.path(), &LockRecord::new(DEAD_PID, "gone", None));
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    lock.release().expect("stale lock releases");
    assert!(!lock.lock_path().exists());
}

#[test]
fn force_release_removes_any_lock() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_raw(temp.path(), "garbage");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    lock.force_release().expect("forced");
    assert!(!lock.lock_path().exists());
    lock.force_release().expect("forcing an absent lock is fine");
}

#[test]
fn check_passes_for_absent_own_and_stale_locks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

    lock.check().expect("absent");
    lock.acquire("mine").expect("acquired");
    lock.check().expect("own");

    seed_lock(temp.path(), &LockRecord::new(DEAD_PID, "gone", None));
    lock.check().expect("stale");
    assert!(!lock.lock_path().exists(), "stale lock cleaned by check");
}

#[test]
fn check_rejects_corrupt_lock() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_raw(temp.path(), "[]");
    let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());
    assert!(matches!(lock.check(), Err(AppError::InvalidLock(_))));
}

#[test]
fn lock_follows_configured_names() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = IdentityConfig::from_toml_str("runtime_dir = \"state\"\nlock_file = \"owner.json\"")
        .expect("config");
    let lock = IdentityLock::new(temp.path(), &config);

    lock.acquire("s").expect("acquired");
    assert!(temp.path().join("state").join("owner.json").exists());
}

#[test]
fn contended_guard_reports_collision_with_current_holder() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = IdentityConfig::default();
    seed_lock(temp.path(), &LockRecord::new(DEAD_PID, "claiming", None));

    let guard_path = config
        .runtime_dir_in(temp.path())
        .join(format!("{}.guard", config.lock_file));
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&guard_path)
        .expect("open guard");
    let mut other = fd_lock::RwLock::new(file);
    let _held = other.try_write().expect("take guard");

    let err = IdentityLock::new(temp.path(), &config)
        .acquire("late")
        .expect_err("guard is held");
    match err {
        AppError::Locked(collision) => {
            assert_eq!(collision.identity_dir, temp.path());
            assert_eq!(
                collision.holder.map(|h| h.session_id).as_deref(),
                Some("claiming")
            );
        }
        unexpected => panic!("expected lock collision, got {unexpected}"),
    }
}

/// Set in child processes spawned by the stale-lock race; names the shared
/// race directory.
const RACE_DIR_ENV: &str = "TOWN_IDENTITY_LOCK_RACE_DIR";
const RACE_TEST: &str = "unit::identity_lock_tests::one_process_wins_a_stale_lock_race";
const RACERS: usize = 6;

fn wait_for(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !path.exists() {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

/// One racer: wait for the start signal, try to claim the identity, record
/// the outcome, and stay alive until the parent has seen every outcome.
fn race_as_child(race_dir: &Path) {
    assert!(wait_for(&race_dir.join("go"), Duration::from_secs(30)), "no start signal");

    let lock = IdentityLock::new(race_dir.join("identity"), &IdentityConfig::default());
    let outcome = match lock.acquire(&format!("racer-{}", current_pid())) {
        Ok(_) => "won".to_owned(),
        Err(AppError::Locked(_)) => "lost".to_owned(),
        Err(err) => format!("error: {err}"),
    };
    let outcomes = race_dir.join("outcomes");
    let tmp = outcomes.join(format!("{}.tmp", current_pid()));
    fs::write(&tmp, outcome).expect("write outcome");
    fs::rename(&tmp, outcomes.join(current_pid().to_string())).expect("publish outcome");

    assert!(wait_for(&race_dir.join("done"), Duration::from_secs(30)), "no done signal");
}

#[test]
fn one_process_wins_a_stale_lock_race() {
    if let Some(race_dir) = std::env::var_os(RACE_DIR_ENV) {
        race_as_child(Path::new(&race_dir));
        return;
    }

    let temp = tempfile::tempdir().expect("tempdir");
    let identity = temp.path().join("identity");
    seed_lock(&identity, &LockRecord::new(DEAD_PID, "crashed", None));
    let outcomes = temp.path().join("outcomes");
    fs::create_dir_all(&outcomes).expect("mkdir outcomes");

    let exe = std::env::current_exe().expect("test binary");
    let mut children: Vec<_> = (0..RACERS)
        .map(|_| {
            Command::new(&exe)
                .args([RACE_TEST, "--exact", "--test-threads=1"])
                .env(RACE_DIR_ENV, temp.path())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .expect("spawn racer")
        })
        .collect();

    fs::write(temp.path().join("go"), "").expect("start signal");
    let deadline = Instant::now() + Duration::from_secs(30);
    let results = loop {
        let results: Vec<(i64, String)> = fs::read_dir(&outcomes)
            .expect("read outcomes")
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let pid = entry.file_name().to_str()?.parse().ok()?;
                Some((pid, fs::read_to_string(entry.path()).ok()?))
            })
            .collect();
        if results.len() == RACERS || Instant::now() > deadline {
            break results;
        }
        thread::sleep(Duration::from_millis(10));
    };
    fs::write(temp.path().join("done"), "").expect("done signal");

    for child in &mut children {
        assert!(child.wait().expect("racer exits").success());
    }
    assert_eq!(results.len(), RACERS, "outcomes: {results:?}");
    assert!(
        results.iter().all(|(_, outcome)| outcome == "won" || outcome == "lost"),
        "outcomes: {results:?}"
    );
    let winners: Vec<i64> = results
        .iter()
        .filter(|(_, outcome)| outcome == "won")
        .map(|(pid, _)| *pid)
        .collect();
    assert_eq!(winners.len(), 1, "outcomes: {results:?}");

    let record = IdentityLock::new(&identity, &IdentityConfig::default())
        .read()
        .expect("winner's lock");
    assert_eq!(record.pid, winners[0]);
    assert_eq!(record.session_id, format!("racer-{}", winners[0]));
}

#[cfg(unix)]
mod live_holder {
    use super::*;

    /// PID 1 always exists on unix hosts and is never the test process.
    fn foreign_record() -> LockRecord {
        LockRecord::new(1, "other-session", Some("elsewhere".into()))
    }

    #[test]
    fn acquire_fails_when_another_live_process_holds_lock() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_lock(temp.path(), &foreign_record());
        let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

        let err = lock.acquire("mine").expect_err("held by pid 1");
        let AppError::Locked(collision) = err else {
            panic!("expected lock collision");
        };
        assert_eq!(collision.holder.as_ref().map(|h| h.pid), Some(1));
        assert!(collision.to_string().contains("session: other-session"));
        assert_eq!(lock.read().expect("untouched").session_id, "other-session");
    }

    #[test]
    fn status_names_foreign_holder() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_lock(temp.path(), &foreign_record());
        let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

        assert_eq!(
            lock.status().to_string(),
            "locked by PID 1 (session: other-session)"
        );
    }

    #[test]
    fn release_and_check_refuse_foreign_lock_but_force_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed_lock(temp.path(), &foreign_record());
        let lock = IdentityLock::new(temp.path(), &IdentityConfig::default());

        assert!(matches!(lock.release(), Err(AppError::Locked(_))));
        assert!(matches!(lock.check(), Err(AppError::Locked(_))));
        assert!(lock.lock_path().exists());

        lock.force_release().expect("forced");
        assert!(!lock.lock_path().exists());
    }
}
