use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Host settings for one invocation. Policy settings live in `PolicyConfig`.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// TOML policy file; defaults are used when unset
    pub policy_path: Option<PathBuf>,
    /// JSON run input (market context and snapshots)
    pub input_path: PathBuf,
    /// Where to write the JSON result; stdout when unset
    pub output_path: Option<PathBuf>,
    pub fetch_timeout: Duration,
    pub max_concurrency: usize,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            policy_path: lookup("PICK_POLICY_PATH").map(PathBuf::from),
            input_path: lookup("PICK_INPUT_PATH")
                .map(PathBuf::from)
                .context("PICK_INPUT_PATH not set")?,
            output_path: lookup("PICK_OUTPUT_PATH").map(PathBuf::from),
            fetch_timeout: Duration::from_millis(
                lookup("PICK_FETCH_TIMEOUT_MS")
                    .unwrap_or_else(|| "10000".to_string())
                    .parse()
                    .context("PICK_FETCH_TIMEOUT_MS must be an integer")?,
            ),
            max_concurrency: lookup("PICK_MAX_CONCURRENCY")
                .unwrap_or_else(|| "8".to_string())
                .parse()
                .context("PICK_MAX_CONCURRENCY must be an integer")?,
        };

        if config.max_concurrency == 0 {
            anyhow::bail!("PICK_MAX_CONCURRENCY must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::from_lookup(lookup(&[("PICK_INPUT_PATH", "run.json")])).unwrap();
        assert_eq!(config.input_path, PathBuf::from("run.json"));
        assert!(config.policy_path.is_none());
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn test_input_path_required() {
        assert!(RunnerConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let bad_timeout = lookup(&[("PICK_INPUT_PATH", "x"), ("PICK_FETCH_TIMEOUT_MS", "soon")]);
        assert!(RunnerConfig::from_lookup(bad_timeout).is_err());
        let zero = lookup(&[("PICK_INPUT_PATH", "x"), ("PICK_MAX_CONCURRENCY", "0")]);
        assert!(RunnerConfig::from_lookup(zero).is_err());
    }
}
