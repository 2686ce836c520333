//! Command-line interface definitions.
//!
//! Every option can also come from the environment (a `.env` file in the
//! working directory is loaded first). Schedule, policy and source options may
//! additionally be overridden by a YAML file passed with `--config`.

use clap::{Parser, ValueEnum};

/// Desktop browser User-Agent presented to the source site.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/98.0.4758.102 Safari/537.36";

/// How listing pages are loaded.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserArg {
    /// Fetch the page source directly over HTTP
    Http,
    /// Ask a headless-browser render service for the rendered DOM
    RenderService,
}

/// What the weekly job does when the store is empty.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyDigestPolicy {
    /// Send a digest saying there were no articles this week
    Send,
    /// Send nothing
    Skip,
}

/// When a digest that failed to send is attempted again.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendRetryPolicy {
    /// Retry right after the next daily collection
    NextDailyTick,
    /// Wait for the next weekly trigger
    NextWeek,
}

/// Command-line arguments for the digest service.
///
/// # Examples
///
/// ```sh
/// # Defaults: collect daily at 10:00, send on Saturday at 12:00
/// infopigula_digest --smtp-user me@example.com --recipient you@example.com
///
/// # Render through a headless browser service and send on Sunday evening
/// infopigula_digest --browser render-service \
///     --render-endpoint http://localhost:3000/content \
///     --weekly-day sunday --weekly-at 18:30
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML file overriding schedule, policy and source options
    #[arg(short, long)]
    pub config: Option<String>,

    /// JSON file accumulating the week's articles
    #[arg(short, long, env = "DATA_FILE", default_value = "data.json")]
    pub data_file: String,

    /// Listing page of the news source
    #[arg(long, env = "SOURCE_URL", default_value = "https://infopigula.pl/#/")]
    pub source_url: String,

    /// How listing pages are loaded
    #[arg(long, env = "BROWSER_TYPE", value_enum, default_value_t = BrowserArg::Http)]
    pub browser: BrowserArg,

    /// Render service endpoint, required with `--browser render-service`
    #[arg(long, env = "RENDER_ENDPOINT")]
    pub render_endpoint: Option<String>,

    /// User-Agent header presented to the source
    #[arg(long, env = "USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Page-load attempts per category before giving up until the next run (1-10)
    #[arg(long, env = "PAGE_ATTEMPTS", default_value_t = 3)]
    pub page_attempts: usize,

    /// SMTP relay host
    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    /// SMTP port (465 uses implicit TLS, anything else STARTTLS)
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// Sender address, also used as the SMTP login
    #[arg(long, env = "SRC_MAIL")]
    pub smtp_user: Option<String>,

    /// SMTP password
    #[arg(long, env = "SRC_PWD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Digest recipient
    #[arg(long, env = "DST_MAIL")]
    pub recipient: Option<String>,

    /// Daily collection time (HH:MM, local time)
    #[arg(long, env = "DAILY_AT", default_value = "10:00")]
    pub daily_at: String,

    /// Weekday of the digest dispatch
    #[arg(long, env = "WEEKLY_DAY", default_value = "saturday")]
    pub weekly_day: String,

    /// Digest dispatch time (HH:MM, local time)
    #[arg(long, env = "WEEKLY_AT", default_value = "12:00")]
    pub weekly_at: String,

    /// Seconds between trigger checks
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// What to do when there is nothing to send
    #[arg(long, env = "EMPTY_DIGEST", value_enum, default_value_t = EmptyDigestPolicy::Send)]
    pub empty_digest: EmptyDigestPolicy,

    /// When to retry a digest that failed to send
    #[arg(long, env = "SEND_RETRY", value_enum, default_value_t = SendRetryPolicy::NextDailyTick)]
    pub send_retry: SendRetryPolicy,

    /// Also write logs to this file
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<String>,
}
