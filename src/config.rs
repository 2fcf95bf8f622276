//! Environment configuration for the relay sidecar and the storefront services.

use std::collections::HashMap;
use thiserror::Error;
use crate::domain::aggregates::order::DEFAULT_RETURN_WINDOW_DAYS;
use crate::domain::aggregates::{CancelPolicy, LifecyclePolicy, MissingDeliveryDate};

pub const DEFAULT_RELAY_PORT: u16 = 3001;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Lookup over a fixed set of variables, so parsing can be tested without touching the process env.
#[derive(Debug, Clone, Default)]
pub struct Env(HashMap<String, String>);

impl Env {
    pub fn from_process() -> Self {
        dotenvy::dotenv().ok();
        Self(std::env::vars().collect())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailApiConfig {
    pub url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// `None` logs mail instead of sending it.
    pub mail: Option<MailApiConfig>,
}

impl RelayConfig {
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let allowed_origins = env.get("ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(str::trim).filter(|o| !o.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let mail = match env.get("MAIL_API_URL") {
            None => None,
            Some(url) => Some(MailApiConfig {
                url: url.to_string(),
                api_key: env.get("MAIL_API_KEY").ok_or(ConfigError::Missing("MAIL_API_KEY"))?.to_string(),
                from: env.get("MAIL_FROM").ok_or(ConfigError::Missing("MAIL_FROM"))?.to_string(),
            }),
        };
        Ok(Self { port: env.parse("PORT", DEFAULT_RELAY_PORT)?, allowed_origins, mail })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontConfig {
    pub database_url: String,
    pub mail_relay_url: Option<String>,
    pub lifecycle: LifecyclePolicy,
}

impl StorefrontConfig {
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let cancel = match env.get("CANCEL_POLICY") {
            None | Some("before-delivery") => CancelPolicy::BeforeDelivery,
            Some("pending-only") => CancelPolicy::PendingOnly,
            Some(other) => return Err(ConfigError::Invalid { name: "CANCEL_POLICY", value: other.to_string() }),
        };
        let missing_delivery_date = match env.get("MISSING_DELIVERY_DATE") {
            None | Some("full-window") => MissingDeliveryDate::FullWindow,
            Some("closed") => MissingDeliveryDate::Closed,
            Some(other) => return Err(ConfigError::Invalid { name: "MISSING_DELIVERY_DATE", value: other.to_string() }),
        };
        let return_window_days = env.parse("RETURN_WINDOW_DAYS", DEFAULT_RETURN_WINDOW_DAYS)?;
        if return_window_days < 0 {
            return Err(ConfigError::Invalid { name: "RETURN_WINDOW_DAYS", value: return_window_days.to_string() });
        }
        Ok(Self {
            database_url: env.get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?.to_string(),
            mail_relay_url: env.get("MAIL_RELAY_URL").map(str::to_string),
            lifecycle: LifecyclePolicy { cancel, missing_delivery_date, return_window_days },
        })
    }
}
