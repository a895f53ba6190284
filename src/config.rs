use serde::Deserialize;

use crate::error::{AppError, Result};

/// Environment variables consulted for a token when none is configured,
/// in the order the `gh` CLI itself checks them.
const TOKEN_ENV_VARS: [&str; 2] = ["GH_TOKEN", "GITHUB_TOKEN"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
        }
    }
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl GitHubConfig {
    /// Resolve the API token from config, falling back to the environment.
    pub fn resolve_token(&self) -> Result<String> {
        self.token_from(|name| std::env::var(name).ok())
    }

    fn token_from<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.token
            .clone()
            .into_iter()
            .chain(TOKEN_ENV_VARS.iter().filter_map(|&name| lookup(name)))
            .find(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "No GitHub token configured; set github.token or one of {}",
                    TOKEN_ENV_VARS.join(", ")
                ))
            })
    }
}

/// Deletion policy and pool sizing for one run.
///
/// Built once before the pipeline starts and never mutated afterwards, so
/// workers share it behind an `Arc` without any locking.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Keep notifications on pull requests authored by bots.
    #[serde(default)]
    pub skip_bots: bool,
    /// Keep notifications on closed or merged pull requests.
    #[serde(default)]
    pub skip_closed: bool,
    /// Keep notifications that were already read.
    #[serde(default)]
    pub skip_read: bool,
    /// Compute deletions without issuing them.
    #[serde(default)]
    pub dry_run: bool,
    /// Worker count for both pools, also the capacity of every queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Stop fetching after this many consecutive read notifications; 0 never stops.
    #[serde(default = "default_halt_after")]
    pub halt_after: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            skip_bots: false,
            skip_closed: false,
            skip_read: false,
            dry_run: false,
            workers: default_workers(),
            halt_after: default_halt_after(),
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AppError::Config(
                "policy.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_halt_after() -> usize {
    50
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("gh-flush").required(false));
        }

        // Environment variable overrides with GH_FLUSH_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("GH_FLUSH")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.policy.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_policy_defaults() {
        let policy = PolicyConfig::default();
        assert!(!policy.skip_bots);
        assert!(!policy.skip_closed);
        assert!(!policy.skip_read);
        assert!(!policy.dry_run);
        assert_eq!(policy.halt_after, 50);
        assert!(policy.workers >= 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let policy = PolicyConfig {
            workers: 0,
            ..PolicyConfig::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flush.toml");
        fs::write(
            &path,
            r#"
[github]
api_url = "https://ghe.example.com/api/v3"

[policy]
skip_bots = true
dry_run = true
workers = 3
halt_after = 0
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
        assert!(config.policy.skip_bots);
        assert!(!config.policy.skip_closed);
        assert!(config.policy.dry_run);
        assert_eq!(config.policy.workers, 3);
        assert_eq!(config.policy.halt_after, 0);
    }

    #[test]
    fn test_load_rejects_zero_workers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flush.toml");
        fs::write(&path, "[policy]\nworkers = 0\n").unwrap();

        let err = AppConfig::load(Some(path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_token_prefers_config() {
        let github = GitHubConfig {
            token: Some("from-config".to_string()),
            ..GitHubConfig::default()
        };
        let token = github
            .token_from(|_| Some("from-env".to_string()))
            .unwrap();
        assert_eq!(token, "from-config");
    }

    #[test]
    fn test_token_falls_back_to_env_in_order() {
        let github = GitHubConfig::default();
        let token = github
            .token_from(|name| match name {
                "GH_TOKEN" => Some(String::new()),
                "GITHUB_TOKEN" => Some("fallback".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(token, "fallback");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let github = GitHubConfig::default();
        let err = github.token_from(|_| None).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let github = GitHubConfig {
            token: Some("ghp_secret".to_string()),
            ..GitHubConfig::default()
        };
        let rendered = format!("{github:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
