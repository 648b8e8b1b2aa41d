//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to
//! prevent log leaks; it is only required by commands that talk to
//! Postgres, so `serve --in-memory` runs without one.

use crate::engine::ConsumerOptions;
use crate::error::{Error, Result};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Replica name used when the process is not running inside a container app.
pub const LOCAL_REPLICA_NAME: &str = "localReplica";

#[derive(Debug)]
pub struct Config {
    pub database_url: Option<SecretString>,
    pub queue_name: String,
    pub replica_name: String,
    pub poll_interval: Duration,
    pub invisibility_timeout: Duration,
    pub max_attempts: u32,
    pub work_on_startup: bool,
    pub control_listen_addr: SocketAddr,
    pub stop_check_interval: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, the container environment provides the vars.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup: &lookup };

        let max_attempts: u32 = vars.parsed("MAX_WORK_ITEM_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(Error::Config(
                "MAX_WORK_ITEM_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: vars.optional("DATABASE_URL").map(SecretString::from),
            queue_name: vars.required("WORK_ITEM_QUEUE_NAME")?,
            replica_name: vars
                .optional("CONTAINER_APP_REPLICA_NAME")
                .unwrap_or_else(|| LOCAL_REPLICA_NAME.to_string()),
            poll_interval: Duration::from_secs(vars.parsed("QUEUE_POLL_INTERVAL_SECS", 10)?),
            invisibility_timeout: Duration::from_secs(
                vars.parsed("QUEUE_MESSAGE_INVISIBILITY_SECS", 60)?,
            ),
            max_attempts,
            work_on_startup: vars.parsed("WORK_ON_STARTUP", false)?,
            control_listen_addr: vars.parsed(
                "CONTROL_LISTEN_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8080)),
            )?,
            stop_check_interval: Duration::from_secs(vars.parsed("STOP_CHECK_INTERVAL_SECS", 5)?),
            otel_endpoint: vars.optional("OTEL_ENDPOINT"),
            log_level: vars
                .optional("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The Postgres URL, for commands that need the database.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }

    /// Options for the consumer loop derived from this configuration.
    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            queue_name: self.queue_name.clone(),
            poll_interval: self.poll_interval,
            invisibility_timeout: self.invisibility_timeout,
            max_attempts: self.max_attempts,
        }
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
    }

    fn parsed<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid value for {name} ({raw:?}): {e}"))),
            None => Ok(default),
        }
    }
}
