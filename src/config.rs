use anyhow::{Context, Result};
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub ws_bind:        SocketAddr,
    pub http_bind:      SocketAddr,
    pub db_path:        String,
    pub log_dir:        String,
    pub heartbeat_secs: u64,
    /// Records older than this count as stale in the heartbeat.
    pub stale_secs:     i64,
    pub arb_min_pct:    f64,
    /// Kept out of derivation on top of the reserved reference feeds.
    pub excluded:       Vec<String>,
}

impl HubConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = Self {
            ws_bind:        parse_or(&get, "ODDS_HUB_BIND", "0.0.0.0:9988".parse()?)?,
            http_bind:      parse_or(&get, "ODDS_HTTP_BIND", "127.0.0.1:9989".parse()?)?,
            db_path:        get("ODDS_DB_PATH").unwrap_or_else(|| "data/odds.db".to_string()),
            log_dir:        get("ODDS_LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            heartbeat_secs: parse_or(&get, "ODDS_HEARTBEAT_SECS", 10)?,
            stale_secs:     parse_or(&get, "ODDS_STALE_SECS", 180)?,
            arb_min_pct:    parse_or(&get, "ODDS_ARB_MIN_PCT", 0.0)?,
            excluded:       get("ODDS_EXCLUDED_BROKERS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        if cfg.heartbeat_secs == 0 {
            anyhow::bail!("ODDS_HEARTBEAT_SECS must be > 0");
        }
        if !cfg.arb_min_pct.is_finite() || cfg.arb_min_pct < 0.0 {
            anyhow::bail!("ODDS_ARB_MIN_PCT must be a non-negative number");
        }
        Ok(cfg)
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid {key}={raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Result<HubConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HubConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = cfg(&[]).unwrap();
        assert_eq!(c.ws_bind.port(), 9988);
        assert_eq!(c.http_bind.to_string(), "127.0.0.1:9989");
        assert_eq!(c.db_path, "data/odds.db");
        assert_eq!(c.heartbeat_secs, 10);
        assert_eq!(c.stale_secs, 180);
        assert!(c.excluded.is_empty());
    }

    #[test]
    fn overrides_and_excluded_list() {
        let c = cfg(&[
            ("ODDS_HUB_BIND", "127.0.0.1:7000"),
            ("ODDS_ARB_MIN_PCT", "0.5"),
            ("ODDS_EXCLUDED_BROKERS", " house, ,mirror "),
        ])
        .unwrap();
        assert_eq!(c.ws_bind.port(), 7000);
        assert_eq!(c.arb_min_pct, 0.5);
        assert_eq!(c.excluded, vec!["house".to_string(), "mirror".to_string()]);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(cfg(&[("ODDS_HUB_BIND", "nowhere")]).is_err());
        assert!(cfg(&[("ODDS_HEARTBEAT_SECS", "0")]).is_err());
        assert!(cfg(&[("ODDS_ARB_MIN_PCT", "-1")]).is_err());
    }
}
