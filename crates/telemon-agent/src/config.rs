use crate::sender::{RetryPolicy, WireFormat};
use anyhow::{bail, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line flags. Each one can also be set through the environment
/// variable named next to it and wins over the config file.
#[derive(Debug, Default, Parser)]
#[command(
    name = "telemon-agent",
    about = "Collects runtime metrics and reports them to a telemon server"
)]
pub struct AgentArgs {
    /// Optional TOML config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Server address (host:port or URL)
    #[arg(short = 'a', long = "address", env = "ADDRESS")]
    pub address: Option<String>,

    /// Report interval in seconds
    #[arg(short = 'r', long = "report-interval", env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Poll interval in seconds
    #[arg(short = 'p', long = "poll-interval", env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Wire format used to push metrics
    #[arg(long = "format", env = "WIRE_FORMAT", value_enum)]
    pub wire_format: Option<WireFormat>,

    /// Delivery attempts per metric
    #[arg(long = "retries", env = "SEND_RETRIES")]
    pub send_retries: Option<u32>,

    /// Delay between delivery attempts in milliseconds
    #[arg(long = "retry-delay-ms", env = "SEND_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub wire_format: WireFormat,
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Per-request timeout for a single delivery attempt
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_report_interval() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    2
}

fn default_send_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            report_interval_secs: default_report_interval(),
            poll_interval_secs: default_poll_interval(),
            wire_format: WireFormat::default(),
            send_retries: default_send_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Builds the effective config: file (if any), then flags/environment.
    pub fn from_args(args: &AgentArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, args: &AgentArgs) {
        if let Some(address) = &args.address {
            self.address = address.clone();
        }
        if let Some(secs) = args.report_interval {
            self.report_interval_secs = secs;
        }
        if let Some(secs) = args.poll_interval {
            self.poll_interval_secs = secs;
        }
        if let Some(format) = args.wire_format {
            self.wire_format = format;
        }
        if let Some(retries) = args.send_retries {
            self.send_retries = retries;
        }
        if let Some(ms) = args.retry_delay_ms {
            self.retry_delay_ms = ms;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be at least one second");
        }
        if self.report_interval_secs == 0 {
            bail!("report interval must be at least one second");
        }
        if self.send_retries == 0 {
            bail!("send retries must be at least 1");
        }
        Ok(())
    }

    /// Base URL of the server, adding `http://` when no scheme is given.
    pub fn server_url(&self) -> String {
        let addr = self.address.trim().trim_end_matches('/');
        if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.send_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}
