// src/config.rs

//! Runtime configuration loaded from the environment (and `.env` via dotenv).

use std::env;
use std::path::PathBuf;
use crate::error::{HandyError, Result};

pub const DEFAULT_API_ENDPOINT: &str = "https://www.handyfeeling.com/api/handy-rest/v3";
pub const DEFAULT_CACHE_URLS: [&str; 2] = [
    "https://handyfeeling.com/api/sync/upload",
    "https://tugbud.kaffesoft.com/cache",
];
pub const DEFAULT_TIME_SYNC_FILE: &str = "server_time.json";
pub const DEFAULT_SYNC_SAMPLES: usize = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub connection_key: String,
    pub application_id: Option<String>,
    pub api_endpoint: String,
    /// Ordered failover list, tried first to last.
    pub cache_urls: Vec<String>,
    pub time_sync_file: PathBuf,
    pub sync_samples: usize,
    pub mpv_path: String,
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let connection_key = get("HANDY_CONNECTION_KEY")
            .ok_or_else(|| HandyError::Config("HANDY_CONNECTION_KEY is not set".to_string()))?;

        let cache_urls: Vec<String> = match get("HANDY_CACHE_URLS") {
            Some(list) => list
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            None => DEFAULT_CACHE_URLS.iter().map(|u| u.to_string()).collect(),
        };
        if cache_urls.is_empty() {
            return Err(HandyError::Config(
                "HANDY_CACHE_URLS contains no endpoints".to_string(),
            ));
        }

        let sync_samples = match get("HANDY_SYNC_SAMPLES") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(HandyError::Config(format!(
                        "HANDY_SYNC_SAMPLES must be a positive integer, got {:?}",
                        raw
                    )))
                }
            },
            None => DEFAULT_SYNC_SAMPLES,
        };

        Ok(Self {
            connection_key,
            application_id: get("HANDY_APPLICATION_ID"),
            api_endpoint: get("HANDY_API_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            cache_urls,
            time_sync_file: get("HANDY_TIME_SYNC_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TIME_SYNC_FILE)),
            sync_samples,
            mpv_path: get("MPV_PATH").unwrap_or_else(|| "mpv".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = Config::from_lookup(lookup_from(&[("HANDY_CONNECTION_KEY", "abc")])).unwrap();
        assert_eq!(config.connection_key, "abc");
        assert_eq!(config.application_id, None);
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.cache_urls.len(), 2);
        assert_eq!(config.time_sync_file, PathBuf::from("server_time.json"));
        assert_eq!(config.sync_samples, 30);
        assert_eq!(config.mpv_path, "mpv");
    }

    #[test]
    fn missing_connection_key_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, HandyError::Config(_)));
    }

    #[test]
    fn cache_urls_keep_their_order() {
        let config = Config::from_lookup(lookup_from(&[
            ("HANDY_CONNECTION_KEY", "abc"),
            ("HANDY_CACHE_URLS", "https://b.example/up, https://a.example/up,"),
            ("HANDY_API_ENDPOINT", "http://localhost:9000/v3/"),
        ]))
        .unwrap();
        assert_eq!(config.cache_urls, vec!["https://b.example/up", "https://a.example/up"]);
        assert_eq!(config.api_endpoint, "http://localhost:9000/v3");
    }

    #[test]
    fn separator_only_cache_list_is_rejected() {
        for raw in [",", " , ,"] {
            let err = Config::from_lookup(lookup_from(&[
                ("HANDY_CONNECTION_KEY", "abc"),
                ("HANDY_CACHE_URLS", raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, HandyError::Config(_)), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn zero_samples_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("HANDY_CONNECTION_KEY", "abc"),
            ("HANDY_SYNC_SAMPLES", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, HandyError::Config(_)));
    }
}
