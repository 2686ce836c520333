//! Runtime configuration assembled from the CLI, the environment and an
//! optional YAML override file.
//!
//! # YAML override file
//!
//! Every key is optional; present keys win over CLI and environment values.
//!
//! ```yaml
//! data_file: /var/lib/infopigula/data.json
//! source_url: https://infopigula.pl/#/
//! daily_at: "09:30"
//! weekly_day: sunday
//! weekly_at: "18:00"
//! poll_interval_secs: 30
//! page_attempts: 2
//! empty_digest: skip
//! send_retry: next-week
//! ```

use crate::cli::{BrowserArg, Cli, EmptyDigestPolicy, SendRetryPolicy};
use crate::errors::ConfigError;
use crate::fetch::MAX_PAGE_ATTEMPTS;
use chrono::{NaiveTime, Weekday};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Which page-loading capability the scraper uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserKind {
    Http,
    RenderService { endpoint: Url },
}

/// SMTP settings. Credentials may be absent; sending then fails with an
/// authentication error while collection keeps running.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub recipient: Option<String>,
}

impl MailSettings {
    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.password.is_some() && self.recipient.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub daily_at: NaiveTime,
    pub weekly_day: Weekday,
    pub weekly_at: NaiveTime,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_file: PathBuf,
    pub source_url: Url,
    pub browser: BrowserKind,
    pub user_agent: String,
    pub page_attempts: usize,
    pub mail: MailSettings,
    pub schedule: ScheduleSettings,
    pub empty_digest: EmptyDigestPolicy,
    pub send_retry: SendRetryPolicy,
}

/// Keys accepted in the YAML override file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data_file: Option<String>,
    pub source_url: Option<String>,
    pub daily_at: Option<String>,
    pub weekly_day: Option<String>,
    pub weekly_at: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub page_attempts: Option<usize>,
    pub empty_digest: Option<EmptyDigestPolicy>,
    pub send_retry: Option<SendRetryPolicy>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl AppConfig {
    /// Build the runtime configuration from parsed CLI arguments, applying the
    /// YAML file named by `--config` when present.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let file = FileConfig::load(Path::new(path))?;
                info!(%path, "Loaded config overrides");
                file
            }
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let source_url = file.source_url.unwrap_or(cli.source_url);
        let source_url = Url::parse(&source_url).map_err(|source| ConfigError::InvalidUrl {
            url: source_url.clone(),
            source,
        })?;

        let browser = match cli.browser {
            BrowserArg::Http => BrowserKind::Http,
            BrowserArg::RenderService => {
                let endpoint = cli
                    .render_endpoint
                    .ok_or(ConfigError::MissingSetting("render_endpoint"))?;
                let endpoint = Url::parse(&endpoint).map_err(|source| ConfigError::InvalidUrl {
                    url: endpoint.clone(),
                    source,
                })?;
                BrowserKind::RenderService { endpoint }
            }
        };

        let schedule = ScheduleSettings {
            daily_at: parse_time(file.daily_at.as_deref().unwrap_or(&cli.daily_at))?,
            weekly_day: parse_weekday(file.weekly_day.as_deref().unwrap_or(&cli.weekly_day))?,
            weekly_at: parse_time(file.weekly_at.as_deref().unwrap_or(&cli.weekly_at))?,
            poll_interval: Duration::from_secs(
                file.poll_interval_secs.unwrap_or(cli.poll_interval_secs).max(1),
            ),
        };

        let mail = MailSettings {
            host: cli.smtp_host,
            port: cli.smtp_port,
            user: cli.smtp_user.filter(|s| !s.trim().is_empty()),
            password: cli.smtp_password.filter(|s| !s.is_empty()),
            recipient: cli.recipient.filter(|s| !s.trim().is_empty()),
        };
        if !mail.is_complete() {
            warn!("Email configuration is incomplete (SRC_MAIL, SRC_PWD, DST_MAIL); digests cannot be sent until it is fixed");
        }

        Ok(Self {
            data_file: PathBuf::from(file.data_file.unwrap_or(cli.data_file)),
            source_url,
            browser,
            user_agent: cli.user_agent,
            page_attempts: file
                .page_attempts
                .unwrap_or(cli.page_attempts)
                .clamp(1, MAX_PAGE_ATTEMPTS),
            mail,
            schedule,
            empty_digest: file.empty_digest.unwrap_or(cli.empty_digest),
            send_retry: file.send_retry.unwrap_or(cli.send_retry),
        })
    }
}

/// Parse a `HH:MM` (or `HH:MM:SS`) local time of day.
pub fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTime(s.to_string()))
}

/// Parse an English weekday name, full or abbreviated, any case.
pub fn parse_weekday(s: &str) -> Result<Weekday, ConfigError> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| ConfigError::InvalidWeekday(s.to_string()))
}
