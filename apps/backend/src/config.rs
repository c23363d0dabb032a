//! Server configuration loaded from the environment.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl ServerConfig {
    /// Load configuration from `.env` and environment variables.
    ///
    /// | Env Var              | Default   |
    /// |----------------------|-----------|
    /// | `DATABASE_URL`       | required  |
    /// | `HOST`               | `0.0.0.0` |
    /// | `PORT`               | `3000`    |
    /// | `MAX_DB_CONNECTIONS` | `10`      |
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let port = var_or("PORT", "3000")
            .parse()
            .context("PORT must be a port number")?;
        let max_connections = var_or("MAX_DB_CONNECTIONS", "10")
            .parse()
            .context("MAX_DB_CONNECTIONS must be a positive integer")?;

        Ok(Self {
            database_url,
            host: var_or("HOST", "0.0.0.0"),
            port,
            max_connections,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
