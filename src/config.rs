use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const DEFAULT_INDEED_URL: &str = "https://www.indeed.com";
const DEV_SECRET_KEY: &str = "fallback-key-for-development";
/// Thirty days.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 30 * 24 * 60;

/// Runtime configuration, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub secret_key: String,
    pub token_ttl_minutes: i64,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub indeed_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_path = match lookup("JOBTRACK_DB") {
            Some(path) => PathBuf::from(path),
            None => default_database_path(),
        };

        let secret_key = lookup("JOBTRACK_SECRET_KEY").unwrap_or_else(|| {
            warn!("JOBTRACK_SECRET_KEY not set, using the development key");
            DEV_SECRET_KEY.to_string()
        });

        let token_ttl_minutes = parse_var(&lookup, "JOBTRACK_TOKEN_TTL_MINUTES", 30i64)?;
        if token_ttl_minutes <= 0 || token_ttl_minutes > MAX_TOKEN_TTL_MINUTES {
            return Err(anyhow!(
                "JOBTRACK_TOKEN_TTL_MINUTES must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_MINUTES,
                token_ttl_minutes
            ));
        }

        let timeout_secs = parse_var(&lookup, "JOBTRACK_FETCH_TIMEOUT_SECS", 10u64)?;
        if timeout_secs == 0 {
            return Err(anyhow!("JOBTRACK_FETCH_TIMEOUT_SECS must be positive"));
        }

        Ok(Config {
            database_path,
            secret_key,
            token_ttl_minutes,
            fetch_timeout: Duration::from_secs(timeout_secs),
            user_agent: lookup("JOBTRACK_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            indeed_url: lookup("JOBTRACK_INDEED_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_INDEED_URL.to_string()),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn default_database_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrack") {
        proj_dirs.data_dir().join("jobtrack.db")
    } else {
        PathBuf::from("jobtrack.db")
    }
}
