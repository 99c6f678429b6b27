//! Configuration for pool tooling.

use anyhow::Result;

use crate::hub::HubConnection;

/// Default platform API version.
pub const DEFAULT_API_VERSION: &str = "50.0";

/// Pool tooling configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hub session supplied by the surrounding pipeline.
    pub hub: HubConnection,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `SFPOOL_HUB_INSTANCE_URL`, `SFPOOL_HUB_ACCESS_TOKEN`, and
    /// `SFPOOL_HUB_USERNAME` are required; `SFPOOL_API_VERSION` and
    /// `SFPOOL_LOG_LEVEL` have defaults.
    pub fn from_env() -> Result<Self> {
        let instance_url = require_env("SFPOOL_HUB_INSTANCE_URL")?;
        let access_token = require_env("SFPOOL_HUB_ACCESS_TOKEN")?;
        let username = require_env("SFPOOL_HUB_USERNAME")?;

        let api_version = std::env::var("SFPOOL_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

        let log_level = std::env::var("SFPOOL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            hub: HubConnection {
                instance_url,
                access_token,
                username,
                api_version,
            },
            log_level,
        })
    }

    /// Install the global tracing subscriber at the configured level.
    ///
    /// `RUST_LOG` takes precedence over `SFPOOL_LOG_LEVEL` when set.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(&self.log_level))?;

        tracing_subscriber::fmt().with_env_filter(filter).try_init().map_err(|e| {
            anyhow::anyhow!("failed to install tracing subscriber: {e}")
        })?;

        Ok(())
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{name} must be set"))
}
