//! Output format flag parsing and role name parsing used by the CLI.

use clap::ValueEnum as _;
use town_identity::mode::{OutputFormat, RunFlags};
use town_identity::models::Role;

#[test]
fn output_format_default_is_text() {
    assert_eq!(OutputFormat::default(), OutputFormat::Text);
    assert!(!RunFlags::default().is_json());
}

#[test]
fn output_format_parsed_from_string() {
    let format = OutputFormat::from_str("json", false).expect("json is a valid format");
    assert_eq!(format, OutputFormat::Json);
    assert!(OutputFormat::from_str("yaml", false).is_err());
}

#[test]
fn output_format_possible_value_names() {
    let names: Vec<String> = OutputFormat::value_variants()
        .iter()
        .filter_map(OutputFormat::to_possible_value)
        .map(|v| v.get_name().to_owned())
        .collect();
    assert_eq!(names, ["text", "json"]);
}

#[test]
fn dry_run_forbids_writes() {
    let flags = RunFlags {
        dry_run: true,
        ..RunFlags::default()
    };
    assert!(!flags.writes_allowed());
    assert!(RunFlags::default().writes_allowed());
}

#[test]
fn role_names_parse_and_display_symmetrically() {
    for role in Role::KNOWN {
        let parsed: Role = role.as_str().parse().expect("known role parses");
        assert_eq!(parsed, role);
        assert_eq!(role.to_string(), role.as_str());
    }
    assert_eq!("polecats".parse::<Role>(), Ok(Role::Polecat));
    assert!("unknown".parse::<Role>().is_err());
}

#[test]
fn role_classes_partition_known_roles() {
    for role in Role::KNOWN {
        assert_ne!(role.is_worker(), role.is_infrastructure(), "{role}");
        assert!(!role.description().is_empty());
    }
    assert!(!Role::Unknown.is_worker());
    assert!(!Role::Unknown.is_infrastructure());
}
