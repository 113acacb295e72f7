use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use harvester_engine::Credentials;
use log::LevelFilter;

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth_url: String,
    pub credentials: Credentials,
    /// Query URLs in order; the third one is the baseline.
    pub sources: [String; 3],
    pub workers: usize,
    pub renewal_cooldown: Duration,
    pub output_dir: PathBuf,
    pub log_level: LevelFilter,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => bail!("missing required environment variable {key}"),
            }
        };

        let workers = match lookup("SOURCE_WORKERS") {
            Some(raw) => {
                let workers: usize = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("SOURCE_WORKERS is not a number: {raw}"))?;
                if workers < 1 {
                    bail!("SOURCE_WORKERS must be at least 1");
                }
                workers
            }
            None => 4,
        };
        let renewal_cooldown = match lookup("RENEWAL_COOLDOWN_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("RENEWAL_COOLDOWN_SECS is not a number: {raw}"))?,
            ),
            None => Duration::from_secs(30),
        };

        Ok(Self {
            auth_url: required("AUTH_URL")?,
            credentials: Credentials {
                client_id: required("CLIENT_ID")?,
                realm: required("REALM")?,
                username: required("USERNAME")?,
                password: required("PASSWORD")?,
            },
            sources: [
                required("SOURCE_URL")?,
                required("SOURCE2_URL")?,
                required("SOURCE3_URL")?,
            ],
            workers,
            renewal_cooldown,
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_level: engine_logging::parse_level(&lookup("LOG_LEVEL").unwrap_or_default()),
        })
    }
}
