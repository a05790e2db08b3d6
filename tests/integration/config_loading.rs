//! Config file loading, env overrides, and validation.

use reminder_engine::config::{Cadence, ConfigSeverity, validate_config};
use reminder_engine::ReminderConfig;
use std::collections::HashMap;

#[test]
fn partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[policy]
lead_time_secs = 86400

[whatsapp]
cooldown_secs = 43200
utc_offset_minutes = 60

[whatsapp.cadence]
type = "daily"
hour = 8
min = 30
"#,
    )
    .unwrap();

    let config = ReminderConfig::from_file(&path).unwrap();
    assert_eq!(config.policy.lead_time_secs, 86_400);
    assert_eq!(config.whatsapp.cooldown_secs, 43_200);
    assert_eq!(config.whatsapp.cadence, Cadence::Daily { hour: 8, min: 30 });
    assert_eq!(config.push.cooldown_secs, 300);
    assert_eq!(config.push.cadence, Cadence::Interval { secs: 60 });
    assert_eq!(config.whatsapp.template_name, "message_simple");
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReminderConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.policy.lead_time_secs, 3 * 24 * 3600);
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[push\nenabled = ").unwrap();
    let err = ReminderConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, reminder_engine::ReminderError::Config(_)));
}

#[test]
fn env_overrides_fill_credentials() {
    let env: HashMap<&str, &str> = [
        ("FCM_ACCESS_TOKEN", "fcm-token"),
        ("FCM_PROJECT_ID", "tasks-app"),
        ("WHATSAPP_ACCESS_TOKEN", "wa-token"),
        ("WHATSAPP_PHONE_NUMBER_ID", "   "),
    ]
    .into_iter()
    .collect();

    let mut config = ReminderConfig::default();
    config.whatsapp.phone_number_id = "from-file".to_owned();
    config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_owned()));

    assert_eq!(config.push.access_token, "fcm-token");
    assert_eq!(config.push.project_id, "tasks-app");
    assert_eq!(config.whatsapp.access_token, "wa-token");
    // Blank values do not clobber the file.
    assert_eq!(config.whatsapp.phone_number_id, "from-file");

    let blocking: Vec<_> = validate_config(&config)
        .into_iter()
        .filter(|issue| issue.severity == ConfigSeverity::Error)
        .collect();
    assert!(blocking.is_empty(), "unexpected issues: {blocking:?}");
}

#[test]
fn default_config_reports_missing_credentials() {
    let issues = validate_config(&ReminderConfig::default());
    let ids: Vec<_> = issues.iter().map(|issue| issue.id.as_str()).collect();
    assert!(ids.contains(&"push-missing-access-token"));
    assert!(ids.contains(&"whatsapp-missing-phone-number-id"));
}
