use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 25 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub upload_dir: PathBuf,
    pub max_upload_size: u64,
    pub session_ttl_days: i64,
    pub cookie_secure: bool,
    pub bcrypt_cost: u32,
    pub log_level: String,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

impl Settings {
    /// Defaults, then `config/settings.toml` if present, then the environment
    /// (`.env` is loaded first).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::builder()?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000)?
            .set_default("db_max_connections", 10)?
            .set_default("upload_dir", "uploads")?
            .set_default("max_upload_size", DEFAULT_MAX_UPLOAD_SIZE)?
            .set_default("session_ttl_days", 7)?
            .set_default("cookie_secure", false)?
            .set_default("bcrypt_cost", bcrypt::DEFAULT_COST)?
            .set_default("log_level", "info")
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// Admin account to create on startup, when both halves are configured.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.bootstrap_admin_email, &self.bootstrap_admin_password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}
