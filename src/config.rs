use crate::repository::DEFAULT_RETENTION;
use anyhow::Context;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 10000;

/// Process settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub port: u16,
  /// When set, records live in Redis instead of process memory.
  pub redis_url: Option<String>,
  /// Lifetime of lobby and game-state records.
  pub retention: Duration,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      port: DEFAULT_PORT,
      redis_url: None,
      retention: DEFAULT_RETENTION,
    }
  }
}

impl ServerConfig {
  /// Read `PORT`, `REDIS_URL` and `RETENTION_HOURS`.
  pub fn from_env() -> anyhow::Result<Self> {
    dotenv::dotenv().ok();
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
    let mut config = Self::default();

    if let Some(port) = lookup("PORT") {
      config.port = port.parse().with_context(|| format!("invalid PORT '{port}'"))?;
    }
    config.redis_url = lookup("REDIS_URL").filter(|url| !url.is_empty());
    if let Some(hours) = lookup("RETENTION_HOURS") {
      let hours: u64 = hours
        .parse()
        .with_context(|| format!("invalid RETENTION_HOURS '{hours}'"))?;
      let secs = hours
        .checked_mul(60 * 60)
        .with_context(|| format!("RETENTION_HOURS '{hours}' is too large"))?;
      config.retention = Duration::from_secs(secs);
    }
    Ok(config)
  }

  pub fn addr(&self) -> String {
    format!("0.0.0.0:{}", self.port)
  }
}
