use std::time::Duration;

use anyhow::{Context, Result};
use mongodb_initdb::OnExisting;

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub database_name: String,
    pub connect_timeout_secs: u64,
    pub step_timeout_secs: u64,
    pub on_existing: OnExisting,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // An explicit URI wins over the individual host settings
        let mongodb_uri = match get("MONGODB_URI") {
            Some(uri) => uri,
            None => {
                let host = get("MONGODB_SMARTER_HOST").unwrap_or_else(|| "localhost".to_string());
                let port: u16 = get("MONGODB_SMARTER_PORT").and_then(|s| s.parse().ok()).unwrap_or(27017);
                let user = get("MONGODB_SMARTER_USER");
                let pass = get("MONGODB_SMARTER_PASS");
                build_uri(&host, port, user.as_deref(), pass.as_deref())
            }
        };
        let database_name = get("DATABASE_NAME").unwrap_or_else(|| "smarter".to_string());
        let connect_timeout_secs = timeout_secs(&get, "CONNECT_TIMEOUT_SECS", 10)?;
        let step_timeout_secs = timeout_secs(&get, "STEP_TIMEOUT_SECS", 300)?;
        let on_existing = match get("INIT_ON_EXISTING") {
            Some(value) => value.parse().context("INIT_ON_EXISTING")?,
            None => OnExisting::default(),
        };

        Ok(Self {
            mongodb_uri,
            database_name,
            connect_timeout_secs,
            step_timeout_secs,
            on_existing,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Connection string with the password masked, for logging
    pub fn redacted_uri(&self) -> String {
        let Some((scheme, rest)) = self.mongodb_uri.split_once("://") else {
            return self.mongodb_uri.clone();
        };
        match rest.rsplit_once('@') {
            Some((credentials, host)) => {
                let user = credentials.split(':').next().unwrap_or_default();
                format!("{}://{}:***@{}", scheme, user, host)
            }
            None => self.mongodb_uri.clone(),
        }
    }
}

/// Unparseable values fall back to `default`; zero would time out every attempt
fn timeout_secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    let secs = get(key).and_then(|s| s.parse().ok()).unwrap_or(default);
    if secs == 0 {
        anyhow::bail!("{} must be at least 1 second", key);
    }
    Ok(secs)
}

fn build_uri(host: &str, port: u16, user: Option<&str>, pass: Option<&str>) -> String {
    match user {
        Some(user) => format!(
            "mongodb://{}:{}@{}:{}/?authSource=admin",
            urlencoding::encode(user),
            urlencoding::encode(pass.unwrap_or_default()),
            host,
            port
        ),
        None => format!("mongodb://{}:{}", host, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.mongodb_uri, "mongodb://localhost:27017");
        assert_eq!(config.database_name, "smarter");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.step_timeout(), Duration::from_secs(300));
        assert_eq!(config.on_existing, OnExisting::Skip);
    }

    #[test]
    fn test_uri_from_host_settings() {
        let config = config(&[
            ("MONGODB_SMARTER_HOST", "db"),
            ("MONGODB_SMARTER_PORT", "27018"),
            ("MONGODB_SMARTER_USER", "admin"),
            ("MONGODB_SMARTER_PASS", "p@ss:word"),
        ])
        .unwrap();
        assert_eq!(
            config.mongodb_uri,
            "mongodb://admin:p%40ss%3Aword@db:27018/?authSource=admin"
        );
        assert_eq!(config.redacted_uri(), "mongodb://admin:***@db:27018/?authSource=admin");
    }

    #[test]
    fn test_explicit_uri_wins() {
        let config = config(&[
            ("MONGODB_URI", "mongodb://mongo:27017"),
            ("MONGODB_SMARTER_HOST", "ignored"),
            ("DATABASE_NAME", "smarter_test"),
        ])
        .unwrap();
        assert_eq!(config.mongodb_uri, "mongodb://mongo:27017");
        assert_eq!(config.redacted_uri(), "mongodb://mongo:27017");
        assert_eq!(config.database_name, "smarter_test");
    }

    #[test]
    fn test_on_existing_policy() {
        let config = config(&[("INIT_ON_EXISTING", "Fail")]).unwrap();
        assert_eq!(config.on_existing, OnExisting::Fail);

        assert!(Config::from_lookup(|k| {
            (k == "INIT_ON_EXISTING").then(|| "overwrite".to_string())
        })
        .is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let err = config(&[("CONNECT_TIMEOUT_SECS", "0")]).unwrap_err();
        assert_eq!(err.to_string(), "CONNECT_TIMEOUT_SECS must be at least 1 second");
        assert!(config(&[("STEP_TIMEOUT_SECS", "0")]).is_err());

        let config = config(&[("CONNECT_TIMEOUT_SECS", "1")]).unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = config(&[("CONNECT_TIMEOUT_SECS", "soon"), ("MONGODB_SMARTER_PORT", "x")]).unwrap();
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.mongodb_uri, "mongodb://localhost:27017");
    }
}
