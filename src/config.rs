//! Configuration types for the reminder engine.

use crate::model::Channel;
use crate::policy::DEFAULT_LEAD_TIME_SECS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "REMINDER_CONFIG";

/// Upper bound for every `*_secs` duration setting: ten years.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Reminder window policy.
    pub policy: PolicyConfig,
    /// Scan cycle tuning.
    pub scan: ScanConfig,
    /// Push channel (FCM).
    pub push: PushChannelConfig,
    /// WhatsApp channel (Cloud API templates).
    pub whatsapp: WhatsAppChannelConfig,
    /// Task/user store.
    pub store: StoreConfig,
}

/// Reminder window policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// How far before the deadline the reminder window opens (seconds).
    pub lead_time_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            lead_time_secs: DEFAULT_LEAD_TIME_SECS,
        }
    }
}

/// Scan cycle settings shared by all channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum candidates processed concurrently within one cycle.
    pub max_concurrency: usize,
    /// Upper bound on a single adapter call; a timeout counts as transient.
    pub dispatch_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            dispatch_timeout_secs: 15,
        }
    }
}

/// How often a channel's scan cycle runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cadence {
    /// Run every N seconds.
    Interval {
        /// Interval in seconds between runs.
        secs: u64,
    },
    /// Run once daily at a given local hour and minute.
    Daily {
        /// Hour of day (0-23, local).
        hour: u8,
        /// Minute of hour (0-59).
        min: u8,
    },
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { secs } => {
                if *secs >= 3600 {
                    write!(f, "every {} hours", secs / 3600)
                } else if *secs >= 60 {
                    write!(f, "every {} minutes", secs / 60)
                } else {
                    write!(f, "every {secs} seconds")
                }
            }
            Self::Daily { hour, min } => write!(f, "daily at {hour:02}:{min:02}"),
        }
    }
}

/// Push channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushChannelConfig {
    pub enabled: bool,
    /// Minimum spacing between two pushes for the same task (seconds).
    pub cooldown_secs: u64,
    pub cadence: Cadence,
    /// Outbound sends allowed per minute (0 = unlimited).
    pub max_sends_per_minute: u32,
    /// Firebase project identifier.
    pub project_id: String,
    /// OAuth2 bearer token for the FCM HTTP v1 API.
    pub access_token: String,
    /// FCM API base URL.
    pub api_base: String,
    /// Notification title; `{title}` is replaced with the task title.
    pub title_template: String,
    /// Notification body; `{title}` is replaced with the task title.
    pub body_template: String,
    pub request_timeout_secs: u64,
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 5 * 60,
            cadence: Cadence::Interval { secs: 60 },
            max_sends_per_minute: 0,
            project_id: String::new(),
            access_token: String::new(),
            api_base: "https://fcm.googleapis.com".to_owned(),
            title_template: "Task reminder".to_owned(),
            body_template: "Task \"{title}\" is due soon".to_owned(),
            request_timeout_secs: 10,
        }
    }
}

/// WhatsApp channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppChannelConfig {
    pub enabled: bool,
    /// Minimum spacing between two template messages for the same task (seconds).
    pub cooldown_secs: u64,
    pub cadence: Cadence,
    /// Fixed offset from UTC (minutes) used for daily cadence and rendered dates.
    pub utc_offset_minutes: i32,
    pub max_sends_per_minute: u32,
    pub access_token: String,
    pub phone_number_id: String,
    pub api_base: String,
    pub api_version: String,
    pub template_name: String,
    pub language_code: String,
    /// Second template parameter, shown after the greeting.
    pub intro_line: String,
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 6 * 3600,
            cadence: Cadence::Interval { secs: 600 },
            utc_offset_minutes: -300,
            max_sends_per_minute: 10,
            access_token: String::new(),
            phone_number_id: String::new(),
            api_base: "https://graph.facebook.com".to_owned(),
            api_version: "v18.0".to_owned(),
            template_name: "message_simple".to_owned(),
            language_code: "es_PE".to_owned(),
            intro_line: "Pending task reminder:".to_owned(),
            request_timeout_secs: 10,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("reminders.db"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(data) = std::env::var_os("XDG_DATA_HOME") {
        PathBuf::from(data).join("reminder-engine")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("reminder-engine")
    } else {
        PathBuf::from("/tmp").join("reminder-engine")
    }
}

impl ReminderConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ReminderError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ReminderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` when it exists, otherwise defaults; then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay secrets supplied through the environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(token) = non_empty("FCM_ACCESS_TOKEN") {
            self.push.access_token = token;
        }
        if let Some(project) = non_empty("FCM_PROJECT_ID") {
            self.push.project_id = project;
        }
        if let Some(token) = non_empty("WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = token;
        }
        if let Some(phone_id) = non_empty("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = phone_id;
        }
    }

    /// Whether a channel's scheduler should run.
    #[must_use]
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Push => self.push.enabled,
            Channel::WhatsApp => self.whatsapp.enabled,
        }
    }

    #[must_use]
    pub fn cadence(&self, channel: Channel) -> &Cadence {
        match channel {
            Channel::Push => &self.push.cadence,
            Channel::WhatsApp => &self.whatsapp.cadence,
        }
    }

    #[must_use]
    pub fn cooldown_secs(&self, channel: Channel) -> u64 {
        match channel {
            Channel::Push => self.push.cooldown_secs,
            Channel::WhatsApp => self.whatsapp.cooldown_secs,
        }
    }

    #[must_use]
    pub fn max_sends_per_minute(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Push => self.push.max_sends_per_minute,
            Channel::WhatsApp => self.whatsapp.max_sends_per_minute,
        }
    }

    /// Returns the config file path: `$REMINDER_CONFIG`, else
    /// `~/.config/reminder-engine/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR) {
            PathBuf::from(explicit)
        } else if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config)
                .join("reminder-engine")
                .join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("reminder-engine")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/reminder-engine/config.toml")
        }
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// Validation issue surfaced at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub id: String,
    pub title: String,
    pub severity: ConfigSeverity,
    pub summary: String,
}

impl ConfigIssue {
    fn error(id: impl Into<String>, title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            severity: ConfigSeverity::Error,
            summary: summary.into(),
        }
    }

    fn warning(
        id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            severity: ConfigSeverity::Warning,
            summary: summary.into(),
        }
    }
}

fn too_long(id: impl Into<String>, key: impl Into<String>) -> ConfigIssue {
    let key = key.into();
    ConfigIssue::error(
        id,
        format!("{key} is too large"),
        format!("{key} must be at most {MAX_DURATION_SECS} seconds (ten years)."),
    )
}

/// Validate configuration without network calls.
#[must_use]
pub fn validate_config(config: &ReminderConfig) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    if !config.push.enabled && !config.whatsapp.enabled {
        issues.push(ConfigIssue::warning(
            "no-channels-enabled",
            "No channels enabled",
            "Both push and WhatsApp are disabled; no reminders will be sent.",
        ));
    }

    if config.policy.lead_time_secs == 0 {
        issues.push(ConfigIssue::warning(
            "zero-lead-time",
            "Lead time is zero",
            "Reminders will only start once the deadline itself has passed.",
        ));
    }

    if config.policy.lead_time_secs > MAX_DURATION_SECS {
        issues.push(too_long("policy-lead-time-too-long", "policy.lead_time_secs"));
    }

    if config.scan.dispatch_timeout_secs > MAX_DURATION_SECS {
        issues.push(too_long(
            "scan-dispatch-timeout-too-long",
            "scan.dispatch_timeout_secs",
        ));
    }

    if config.scan.max_concurrency == 0 {
        issues.push(ConfigIssue::error(
            "scan-zero-concurrency",
            "Scan concurrency is zero",
            "scan.max_concurrency must be at least 1.",
        ));
    }

    for channel in Channel::ALL {
        if !config.channel_enabled(channel) {
            continue;
        }
        let id = channel.as_str();

        if config.cooldown_secs(channel) > MAX_DURATION_SECS {
            issues.push(too_long(
                format!("{id}-cooldown-too-long"),
                format!("{id}.cooldown_secs"),
            ));
        }

        if config.cooldown_secs(channel) == 0 {
            issues.push(ConfigIssue::error(
                format!("{id}-zero-cooldown"),
                format!("{id} cooldown is zero"),
                "A zero cooldown would resend the same reminder on every tick.",
            ));
        }

        match config.cadence(channel) {
            Cadence::Interval { secs: 0 } => issues.push(ConfigIssue::error(
                format!("{id}-zero-interval"),
                format!("{id} tick interval is zero"),
                "cadence.secs must be at least 1.",
            )),
            Cadence::Interval { secs } if *secs > MAX_DURATION_SECS => {
                issues.push(too_long(
                    format!("{id}-interval-too-long"),
                    format!("{id}.cadence.secs"),
                ));
            }
            Cadence::Interval { secs } if *secs > config.cooldown_secs(channel) => {
                issues.push(ConfigIssue::warning(
                    format!("{id}-interval-exceeds-cooldown"),
                    format!("{id} ticks less often than its cooldown"),
                    format!(
                        "Reminders will be spaced by the {secs}s tick interval, not the {}s cooldown.",
                        config.cooldown_secs(channel)
                    ),
                ));
            }
            Cadence::Daily { hour, min } if *hour > 23 || *min > 59 => {
                issues.push(ConfigIssue::error(
                    format!("{id}-invalid-daily-time"),
                    format!("{id} daily cadence is out of range"),
                    format!("{hour:02}:{min:02} is not a valid time of day."),
                ));
            }
            _ => {}
        }
    }

    if config.push.enabled {
        if config.push.access_token.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "push-missing-access-token",
                "FCM access token missing",
                "Push is enabled but access token is empty.",
            ));
        }
        if config.push.project_id.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "push-missing-project-id",
                "FCM project ID missing",
                "Push is enabled but project ID is empty.",
            ));
        }
    }

    if config.whatsapp.enabled {
        if config.whatsapp.access_token.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "whatsapp-missing-access-token",
                "WhatsApp access token missing",
                "WhatsApp is enabled but access token is empty.",
            ));
        }
        if config.whatsapp.phone_number_id.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "whatsapp-missing-phone-number-id",
                "WhatsApp phone number ID missing",
                "WhatsApp is enabled but phone number ID is empty.",
            ));
        }
        if config.whatsapp.template_name.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "whatsapp-missing-template",
                "WhatsApp template name missing",
                "Reminders are sent as templates; template_name must be set.",
            ));
        }
        if config.whatsapp.utc_offset_minutes.abs() >= 24 * 60 {
            issues.push(ConfigIssue::error(
                "whatsapp-invalid-utc-offset",
                "WhatsApp UTC offset out of range",
                "utc_offset_minutes must be within ±1439.",
            ));
        }
    }

    issues
}
