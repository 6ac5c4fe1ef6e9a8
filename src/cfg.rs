use std::{env::var, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use crate::errors::ConfigError;

pub type Config = Arc<Configuration>;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_HISTORY_PATH: &str = "chat_history.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_UPLOAD_TICK_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct Configuration {
    /// Base URL of the RAG backend, without trailing slash.
    pub api_url: String,
    /// SQLite database holding persisted conversations.
    pub history_path: PathBuf,
    /// Deadline applied to every backend request.
    pub request_timeout: Duration,
    // Interval between upload progress estimates.
    pub upload_tick: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            upload_tick: Duration::from_millis(DEFAULT_UPLOAD_TICK_MS),
        }
    }
}

impl Configuration {
    pub fn new() -> Result<Config, ConfigError> {
        let api_url = var("RAG_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let history_path = var("RAG_HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_HISTORY_PATH));
        let timeout_secs = parse_var("RAG_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let tick_ms = parse_var("RAG_UPLOAD_TICK_MS", DEFAULT_UPLOAD_TICK_MS)?;

        Ok(Arc::new(Configuration {
            api_url,
            history_path,
            request_timeout: Duration::from_secs(timeout_secs),
            upload_tick: Duration::from_millis(tick_ms),
        }))
    }

    pub fn set_api_url(&mut self, api_url: String) {
        self.api_url = api_url.trim_end_matches('/').to_string()
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Ok(value) => parse_value(name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        var: name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        let secs: u64 = parse_value("RAG_REQUEST_TIMEOUT_SECS", " 30 ").unwrap();
        assert_eq!(secs, 30);
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let err = parse_value::<u64>("RAG_UPLOAD_TICK_MS", "soon").unwrap_err();
        assert_eq!(err.to_string(), "Invalid value 'soon' for RAG_UPLOAD_TICK_MS");
    }

    #[test]
    fn test_set_api_url_strips_trailing_slash() {
        let mut cfg = Configuration::default();
        cfg.set_api_url("http://rag.local:9000/".to_string());
        assert_eq!(cfg.api_url, "http://rag.local:9000");
    }
}
