//! Service configuration read from the environment.
//!
//! Every variable is optional; `.env` files are honoured through `dotenvy` in `main`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::Catalog;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    /// Base of the download links handed to clients.
    pub public_url: String,
    /// Directory of dataset descriptors; the built-in catalog when absent.
    pub catalog_dir: Option<PathBuf>,
    pub job_step_delay: Duration,
    pub job_steps: u32,
    pub history_limit: usize,
    pub seed: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            public_url: "http://localhost:3000".to_string(),
            catalog_dir: None,
            job_step_delay: Duration::from_millis(500),
            job_steps: 5,
            history_limit: 50,
            seed: 20250101,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: lookup("EXPORT_BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_url: lookup("EXPORT_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            catalog_dir: lookup("EXPORT_CATALOG_DIR").map(PathBuf::from),
            job_step_delay: parse_var::<u64, _>(&lookup, "EXPORT_JOB_STEP_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.job_step_delay),
            job_steps: parse_var(&lookup, "EXPORT_JOB_STEPS")?.unwrap_or(defaults.job_steps),
            history_limit: parse_var(&lookup, "EXPORT_HISTORY_LIMIT")?
                .unwrap_or(defaults.history_limit),
            seed: parse_var(&lookup, "EXPORT_SEED")?.unwrap_or(defaults.seed),
        })
    }

    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog_dir {
            Some(dir) => Catalog::load_from_dir(dir),
            None => Ok(Catalog::builtin()),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.job_step_delay, Duration::from_millis(500));
        assert_eq!(config.job_steps, 5);
        assert!(config.catalog_dir.is_none());
        assert_eq!(config.load_catalog().unwrap().list_datasets().len(), 5);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("EXPORT_PUBLIC_URL", "https://exports.example.org/"),
            ("EXPORT_JOB_STEP_MS", "20"),
            ("EXPORT_HISTORY_LIMIT", "3"),
        ]))
        .unwrap();
        assert_eq!(config.public_url, "https://exports.example.org");
        assert_eq!(config.job_step_delay, Duration::from_millis(20));
        assert_eq!(config.history_limit, 3);
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = ServiceConfig::from_lookup(lookup(&[("EXPORT_JOB_STEPS", "five")])).unwrap_err();
        assert!(err.to_string().contains("EXPORT_JOB_STEPS"));
    }
}
