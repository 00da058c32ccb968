use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::engine::{DeliveryPolicy, DispatchPolicy, EngineSettings};
use crate::monitoring::types::Target;
use crate::validation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("{0:#}")]
    Invalid(anyhow::Error),
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS from the first byte, usually port 465.
    #[default]
    Implicit,
    /// Plain connection upgraded with STARTTLS, usually port 587.
    Starttls,
    /// No encryption, for local relays only.
    None,
}

impl FromStr for TlsMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "implicit" | "tls" | "ssl" => Ok(TlsMode::Implicit),
            "starttls" => Ok(TlsMode::Starttls),
            "none" | "plain" => Ok(TlsMode::None),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMode::Implicit => write!(f, "implicit"),
            TlsMode::Starttls => write!(f, "starttls"),
            TlsMode::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub email: EmailConfig,
    pub liveness: LivenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub targets: Vec<String>,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub settle_seconds: u64,
    pub dispatch: DispatchPolicy,
    pub exit_when_done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub recipients: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    /// Sender mailbox; defaults to `Uptime Monitor <username>`.
    pub from: Option<String>,
    pub delivery: DeliveryPolicy,
    pub notify_on_start: bool,
    pub notify_all_clear: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interval_seconds: 20,
            timeout_seconds: 10,
            settle_seconds: 0,
            dispatch: DispatchPolicy::default(),
            exit_when_done: false,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            username: None,
            password: None,
            host: "smtp.gmail.com".into(),
            port: 465,
            tls: TlsMode::default(),
            from: None,
            delivery: DeliveryPolicy::default(),
            notify_on_start: true,
            notify_all_clear: false,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 3000 }
    }
}

impl EmailConfig {
    /// The sender mailbox, falling back to the SMTP username.
    pub fn sender(&self) -> Option<String> {
        self.from
            .clone()
            .or_else(|| self.username.as_ref().map(|user| format!("Uptime Monitor <{user}>")))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let unset = "(unset)";

        writeln!(f, "Effective Configuration:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "Targets", &self.monitor.targets.join(", "))?;
        write_1(f, "Retry Interval (s)", &self.monitor.interval_seconds)?;
        write_1(f, "Probe Timeout (s)", &self.monitor.timeout_seconds)?;
        write_1(f, "Settle Delay (s)", &self.monitor.settle_seconds)?;
        write_1(f, "Dispatch", &self.monitor.dispatch)?;
        write_1(f, "Exit When Done", &self.monitor.exit_when_done)?;

        write_title_1(f, "Email")?;
        write_1(f, "Recipients", &self.email.recipients.join(", "))?;
        write_1(f, "SMTP Host", &format!("{}:{} ({})", self.email.host, self.email.port, self.email.tls))?;
        write_1(f, "Username", &self.email.username.as_deref().unwrap_or(unset))?;
        write_1(f, "Password", &if self.email.password.is_some() { "********" } else { unset })?;
        write_1(f, "From", &self.email.sender().unwrap_or_else(|| unset.into()))?;
        write_1(f, "Delivery", &self.email.delivery)?;
        write_1(f, "Notify On Start", &self.email.notify_on_start)?;
        write_1(f, "Notify All Clear", &self.email.notify_all_clear)?;

        write_title_1(f, "Liveness")?;
        write_1(f, "Bind Address", &format!("{}:{}", self.liveness.bind, self.liveness.port))?;

        Ok(())
    }
}

impl Config {
    /// Load defaults, then the optional TOML file, then environment
    /// overrides, and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Override fields from environment-style variables.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup("TARGET_URLS") {
            self.monitor.targets = split_list(&value);
        }
        override_parsed(&lookup, "RETRY_INTERVAL_SECONDS", &mut self.monitor.interval_seconds)?;
        override_parsed(&lookup, "PROBE_TIMEOUT_SECONDS", &mut self.monitor.timeout_seconds)?;
        override_parsed(&lookup, "SETTLE_SECONDS", &mut self.monitor.settle_seconds)?;
        override_parsed(&lookup, "DISPATCH", &mut self.monitor.dispatch)?;
        override_bool(&lookup, "EXIT_WHEN_DONE", &mut self.monitor.exit_when_done)?;

        if let Some(value) = lookup("EMAIL_LIST") {
            self.email.recipients = split_list(&value);
        }
        if let Some(value) = lookup("SMTP_USERNAME") {
            self.email.username = Some(value);
        }
        if let Some(value) = lookup("SMTP_PASSWORD") {
            self.email.password = Some(value);
        }
        if let Some(value) = lookup("SMTP_HOST") {
            self.email.host = value;
        }
        override_parsed(&lookup, "SMTP_PORT", &mut self.email.port)?;
        override_parsed(&lookup, "SMTP_TLS", &mut self.email.tls)?;
        if let Some(value) = lookup("EMAIL_FROM") {
            self.email.from = Some(value);
        }
        override_parsed(&lookup, "NOTIFY_DELIVERY", &mut self.email.delivery)?;
        override_bool(&lookup, "NOTIFY_ON_START", &mut self.email.notify_on_start)?;
        override_bool(&lookup, "NOTIFY_ALL_CLEAR", &mut self.email.notify_all_clear)?;

        if let Some(value) = lookup("BIND") {
            self.liveness.bind = value;
        }
        override_parsed(&lookup, "PORT", &mut self.liveness.port)?;

        Ok(())
    }

    /// Reject configurations the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.targets.is_empty() {
            return Err(ConfigError::Missing("monitor.targets / TARGET_URLS"));
        }
        for target in &self.monitor.targets {
            validation::validate_target(target).map_err(ConfigError::Invalid)?;
        }
        validation::validate_check_interval(self.monitor.interval_seconds).map_err(ConfigError::Invalid)?;
        validation::validate_timeout(self.monitor.timeout_seconds).map_err(ConfigError::Invalid)?;
        validation::validate_settle_delay(self.monitor.settle_seconds).map_err(ConfigError::Invalid)?;

        if self.email.recipients.is_empty() {
            return Err(ConfigError::Missing("email.recipients / EMAIL_LIST"));
        }
        for recipient in &self.email.recipients {
            validation::validate_recipient(recipient).map_err(ConfigError::Invalid)?;
        }
        if self.email.username.is_none() {
            return Err(ConfigError::Missing("email.username / SMTP_USERNAME"));
        }
        if self.email.password.is_none() {
            return Err(ConfigError::Missing("email.password / SMTP_PASSWORD"));
        }

        Ok(())
    }

    pub fn targets(&self) -> Vec<Target> {
        self.monitor.targets.iter().cloned().map(Target::from).collect()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.timeout_seconds)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            interval: Duration::from_secs(self.monitor.interval_seconds),
            settle_delay: Duration::from_secs(self.monitor.settle_seconds),
            dispatch: self.monitor.dispatch,
            delivery: self.email.delivery,
            notify_on_start: self.email.notify_on_start,
            notify_all_clear: self.email.notify_all_clear,
        }
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: value.clone() })?;
    }
    Ok(())
}

fn override_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut bool,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *slot = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(ConfigError::InvalidValue { key, value }),
        };
    }
    Ok(())
}
