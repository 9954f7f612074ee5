use std::env;

use chrono::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

/// Runtime settings, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Postgres connection string. Without it records live in memory.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub session_ttl: Duration,
    pub admin: Option<AdminSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            database_url: None,
            db_max_connections: 5,
            session_ttl: Duration::hours(24),
            admin: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, raw: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; `from_env` uses the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if let Some(raw) = lookup("DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_var("DB_MAX_CONNECTIONS", raw)?;
        }

        if let Some(raw) = lookup("SESSION_TTL_HOURS") {
            let hours: i64 = parse_var("SESSION_TTL_HOURS", raw.clone())?;
            if hours <= 0 {
                return Err(ConfigError::Invalid {
                    name: "SESSION_TTL_HOURS",
                    value: raw,
                    reason: "must be positive".into(),
                });
            }
            config.session_ttl = Duration::hours(hours);
        }

        config.admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            _ => None,
        };

        Ok(config)
    }
}
