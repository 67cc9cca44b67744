//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 8000,
        }
    }
}

/// Storage configuration: where the named SQLite stores live
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub dbs_dir: PathBuf,
    /// Logical name of the administrative store
    pub admin_db_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dbs_dir: PathBuf::from("./dbs"),
            admin_db_name: "admin".to_string(),
        }
    }
}

/// A configured user and the shared credential checked on login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub users: Vec<UserCredential>,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: parse_users(DEFAULT_USERS).unwrap_or_default(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CorsConfig {
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

const DEFAULT_USERS: &str = "admin:1234,test:1234,guest:1234";

/// Flat view of the environment, layered over defaults by the `config` crate
#[derive(Debug, Deserialize)]
struct RawSettings {
    host: String,
    port: u16,
    dbs_dir: String,
    admin_db_name: String,
    app_users: String,
    allowed_origins: String,
    bcrypt_cost: u32,
}

impl Settings {
    /// Load settings from `.env` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let raw: RawSettings = ::config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000_i64)?
            .set_default("dbs_dir", "./dbs")?
            .set_default("admin_db_name", "admin")?
            .set_default("app_users", DEFAULT_USERS)?
            .set_default("allowed_origins", "")?
            .set_default("bcrypt_cost", i64::from(bcrypt::DEFAULT_COST))?
            .add_source(::config::Environment::default())
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let host = raw
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("HOST is not an IPv4 address: {}", raw.host)))?;

        if raw.admin_db_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("ADMIN_DB_NAME must not be empty".to_string()));
        }

        let users = parse_users(&raw.app_users)?;

        let allowed_origins = raw
            .allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            server: ServerConfig { host, port: raw.port },
            storage: StorageConfig {
                dbs_dir: PathBuf::from(raw.dbs_dir),
                admin_db_name: raw.admin_db_name,
            },
            auth: AuthConfig {
                users,
                bcrypt_cost: raw.bcrypt_cost,
            },
            cors: CorsConfig { allowed_origins },
        })
    }
}

/// Parse `name:password` pairs separated by commas, keeping their order
fn parse_users(raw: &str) -> Result<Vec<UserCredential>, ConfigError> {
    let mut users: Vec<UserCredential> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (username, password) = entry.split_once(':').ok_or_else(|| {
            ConfigError::InvalidValue(format!("APP_USERS entry '{}' is not name:password", entry))
        })?;
        let username = username.trim();
        if username.is_empty() {
            return Err(ConfigError::InvalidValue("APP_USERS contains an empty user name".to_string()));
        }
        if users.iter().any(|u| u.username == username) {
            return Err(ConfigError::InvalidValue(format!("APP_USERS lists '{}' twice", username)));
        }
        users.push(UserCredential {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    Ok(users)
}
