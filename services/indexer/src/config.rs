use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,

    pub depth: u32,
    pub data_dir: PathBuf,

    pub ledger_api_url: String,
    pub ledger_timeout: Duration,
    pub reconcile_interval: Duration,

    pub admin_username: String,
    pub admin_password: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key).with_context(|| format!("Missing required env var: {key}"))
        };

        let database_url = get("DATABASE_URL")?;
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let depth: u32 = get("TREE_DEPTH")?
            .parse()
            .context("TREE_DEPTH must be an integer")?;
        let data_dir = PathBuf::from(get("DATA_DIR")?);

        let ledger_api_url = get("LEDGER_API_URL")?;
        let ledger_timeout = secs(lookup("LEDGER_TIMEOUT_SECS"), 10, "LEDGER_TIMEOUT_SECS")?;
        let reconcile_interval =
            secs(lookup("RECONCILE_INTERVAL_SECS"), 2, "RECONCILE_INTERVAL_SECS")?;

        let admin_username = get("ADMIN_USERNAME")?;
        let admin_password = get("ADMIN_PASSWORD")?;

        // fail fast on values that would only blow up later
        if depth == 0 || depth as usize >= ctree::MAX_LEVELS {
            bail!("TREE_DEPTH must be between 1 and {}", ctree::MAX_LEVELS - 1);
        }
        if !ledger_api_url.starts_with("http://") && !ledger_api_url.starts_with("https://") {
            bail!("LEDGER_API_URL must start with http:// or https://");
        }

        Ok(Self {
            database_url,
            bind_addr,
            depth,
            data_dir,
            ledger_api_url,
            ledger_timeout,
            reconcile_interval,
            admin_username,
            admin_password,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.data_dir.join("upd")
    }
}

fn secs(value: Option<String>, default: u64, key: &str) -> Result<Duration> {
    let secs = match value {
        Some(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds"))?,
        None => default,
    };
    if secs == 0 {
        bail!("{key} must be positive");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        env(&[
            ("DATABASE_URL", "postgres://localhost/items"),
            ("TREE_DEPTH", "20"),
            ("DATA_DIR", "/var/lib/indexer"),
            ("LEDGER_API_URL", "https://ledger.example/api/v2/"),
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_PASSWORD", "secret"),
        ])
    }

    #[test]
    fn defaults_apply() {
        let vars = base();
        let cfg = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.depth, 20);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(2));
        assert_eq!(cfg.ledger_timeout, Duration::from_secs(10));
        assert_eq!(cfg.state_path(), PathBuf::from("/var/lib/indexer/state.json"));
    }

    #[test]
    fn missing_var_is_named() {
        let mut vars = base();
        vars.remove("DATA_DIR");
        let err = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("DATA_DIR"));
    }

    #[test]
    fn depth_is_bounded() {
        let mut vars = base();
        vars.insert("TREE_DEPTH".into(), "30".into());
        assert!(AppConfig::from_lookup(|k| vars.get(k).cloned()).is_err());
        vars.insert("TREE_DEPTH".into(), "0".into());
        assert!(AppConfig::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn ledger_url_needs_scheme() {
        let mut vars = base();
        vars.insert("LEDGER_API_URL".into(), "ledger.example".into());
        assert!(AppConfig::from_lookup(|k| vars.get(k).cloned()).is_err());
    }
}
