use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};

/// Runtime configuration, read from the environment (and `.env` in debug builds).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
}

const MIN_SECRET_LEN: usize = 32;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        validate_secret(env::var("JWT_SECRET").ok().as_deref())?;
        let port = match env::var("PORT") {
            Ok(p) => p.parse().with_context(|| format!("PORT is not a port number: {p}"))?,
            Err(_) => 8080,
        };
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            frontend_url: env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            data_dir: env::var("FEED_DATA_DIR").ok().map(PathBuf::from),
        })
    }
}

fn validate_secret(secret: Option<&str>) -> anyhow::Result<()> {
    match secret {
        None => bail!("JWT_SECRET must be set"),
        Some(s) if s.len() < MIN_SECRET_LEN => bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long"),
        Some(_) => Ok(()),
    }
}
