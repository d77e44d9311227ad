// ⚙️ Configuration - environment (and .env) driven
//
//   FUNDING_YEAR                 start year of the funding window (Aug..Jul);
//                                unset = keep every allocation
//   FUNDING_LISTEN_ADDR          server bind address   (0.0.0.0:3000)
//   FUNDING_OUTPUT_DIR           rendered workbooks    (output)
//   FUNDING_SESSION_TTL_MINUTES  scratch state lifetime (30)

use crate::aggregate::FundingWindow;
use chrono::Duration;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub funding_year: Option<i32>,
    pub listen_addr: SocketAddr,
    pub output_dir: PathBuf,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            funding_year: None,
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3000))),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unknown keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        use anyhow::Context;

        let mut config = Config::default();

        if let Some(year) = lookup("FUNDING_YEAR").filter(|v| !v.trim().is_empty()) {
            config.funding_year = Some(
                year.trim()
                    .parse()
                    .with_context(|| format!("Invalid FUNDING_YEAR: {}", year))?,
            );
        }

        if let Some(addr) = lookup("FUNDING_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .with_context(|| format!("Invalid FUNDING_LISTEN_ADDR: {}", addr))?;
        }

        if let Some(dir) = lookup("FUNDING_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(minutes) = lookup("FUNDING_SESSION_TTL_MINUTES") {
            let minutes: i64 = minutes
                .trim()
                .parse()
                .with_context(|| format!("Invalid FUNDING_SESSION_TTL_MINUTES: {}", minutes))?;
            config.session_ttl = Duration::minutes(minutes);
        }

        Ok(config)
    }

    pub fn funding_window(&self) -> Option<FundingWindow> {
        self.funding_year.and_then(FundingWindow::for_year)
    }
}

/// Install the global tracing subscriber (RUST_LOG, default `info`) on stderr
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
