use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use town_identity::lock::LockCollision;
use town_identity::models::LockRecord;
use town_identity::AppError;

fn collision(holder: Option<LockRecord>) -> LockCollision {
    LockCollision {
        identity_dir: PathBuf::from("/town/gastown/crew/max"),
        lock_path: PathBuf::from("/town/gastown/crew/max/.runtime/agent.lock"),
        holder,
    }
}

#[test]
fn display_prefixes_identify_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Workspace("lost".into()), "workspace: lost"),
        (AppError::NotFound("gone".into()), "not found: gone"),
        (AppError::InvalidLock("junk".into()), "invalid lock: junk"),
        (AppError::Io("disk".into()), "io: disk"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn locked_error_names_holder() {
    let holder = LockRecord {
        pid: 4242,
        acquired_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("time"),
        session_id: "sess-1".into(),
        hostname: None,
    };
    let err = AppError::Locked(Box::new(collision(Some(holder))));
    let text = err.to_string();

    assert!(text.starts_with("locked: /town/gastown/crew/max"));
    assert!(text.contains("PID 4242"));
    assert!(text.contains("session: sess-1"));
    assert!(text.contains("acquired: 2026-01-02T03:04:05Z"));
}

#[test]
fn locked_error_without_holder_reports_claim_in_progress() {
    let err = AppError::Locked(Box::new(collision(None)));
    assert!(err.to_string().contains("being claimed by another process"));
}

#[test]
fn remediation_names_identity_directory() {
    let steps = collision(None).remediation();
    assert_eq!(steps.len(), 3);
    assert!(steps[2].contains("/town/gastown/crew/max"));
}

#[test]
fn only_not_found_reports_absence() {
    assert!(AppError::NotFound("x".into()).is_not_found());
    assert!(!AppError::Io("x".into()).is_not_found());
    assert!(!AppError::InvalidLock("x".into()).is_not_found());
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Io("boom".into()));
    assert_eq!(err.to_string(), "io: boom");
}

#[test]
fn toml_errors_convert_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err: AppError = toml_err.into();
    assert!(matches!(err, AppError::Config(_)));
}
