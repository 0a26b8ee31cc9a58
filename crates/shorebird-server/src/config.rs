//! Server configuration from environment variables.

use std::net::SocketAddr;

use anyhow::{Context, Result};

/// Runtime configuration for the gateway server.
///
/// Everything comes from environment variables with development defaults:
/// - `SHOREBIRD_BIND_ADDR`: listen address (default: 0.0.0.0:3000)
/// - `SHOREBIRD_DB_PATH`: database file path (default: in-memory)
/// - `SHOREBIRD_CORS_ORIGINS`: comma-separated allowed origins (default: permissive)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Path to the database file (None for in-memory)
    pub db_path: Option<String>,
    /// Allowed CORS origins (empty means allow any)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("SHOREBIRD_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .context("Invalid SHOREBIRD_BIND_ADDR")?;

        let db_path = std::env::var("SHOREBIRD_DB_PATH").ok().filter(|p| !p.is_empty());

        let cors_origins = std::env::var("SHOREBIRD_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            db_path,
            cors_origins,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            db_path: None,
            cors_origins: Vec::new(),
        }
    }
}
