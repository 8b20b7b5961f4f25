//! Server configuration loading.
//!
//! Layered: defaults, then an optional `veridian.toml`, then
//! `VERIDIAN_`-prefixed environment variables. Secrets (the key
//! encryption key) normally arrive through the environment layer.

use serde::{Deserialize, Serialize};

use veridian_auth::config::AuthConfig;

/// Root server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener configuration.
    pub server: ListenConfig,

    /// Identity provider engine configuration.
    pub auth: AuthConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Bind address.
    pub host: String,

    /// Bind port.
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a layer fails to parse or the resulting
    /// configuration is invalid.
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("veridian").required(false))
            .add_source(
                config::Environment::with_prefix("VERIDIAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.auth.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.auth.validate().is_ok());
    }
}
