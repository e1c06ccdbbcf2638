use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("SERVER_PORT must be a port number")?;

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                // Tokens won't survive a restart without a configured secret.
                let secret = uuid::Uuid::new_v4().to_string();
                tracing::warn!("JWT_SECRET not set, using a generated secret");
                secret
            }
        };
        let jwt_expiry_hours = env::var("JWT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        Ok(AppConfig {
            server: ServerConfig { host, port },
            database_url,
            auth: AuthConfig {
                jwt_secret,
                jwt_expiry_hours,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from(upload_dir),
            },
        })
    }
}
