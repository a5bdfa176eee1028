// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "FEDISCROLL_CONFIG";
pub const ENV_PRELOAD: &str = "FEDISCROLL_PRELOAD";
pub const DEFAULT_CONFIG_PATH: &str = "config/fediscroll.toml";

/// How many items to keep loaded beyond the visible window on each side.
pub const DEFAULT_PRELOAD_AMOUNT: usize = 5;

/// Consecutive empty pages tolerated before pagination is treated as a loop.
///
/// Some servers legitimately chain a few empty sub-collections; no observed
/// server chains more than this.
pub const DEFAULT_MAX_EMPTY_PAGES: usize = 3;

fn default_preload_amount() -> usize {
    DEFAULT_PRELOAD_AMOUNT
}
fn default_max_empty_pages() -> usize {
    DEFAULT_MAX_EMPTY_PAGES
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSettings {
    #[serde(default = "default_preload_amount")]
    pub preload_amount: usize,
    #[serde(default = "default_max_empty_pages")]
    pub max_empty_pages: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            preload_amount: DEFAULT_PRELOAD_AMOUNT,
            max_empty_pages: DEFAULT_MAX_EMPTY_PAGES,
        }
    }
}

/// Engine settings, normally read from TOML:
///
/// ```toml
/// [network]
/// preload_amount = 5
/// max_empty_pages = 3
///
/// [feeds]
/// home = ["https://example.social/users/a/outbox", "@b@example.social"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub network: NetworkSettings,
    /// Named feeds: each is a list of inputs spliced into one timeline.
    #[serde(default)]
    pub feeds: BTreeMap<String, Vec<String>>,
}

impl Settings {
    pub fn preload_amount(&self) -> usize {
        self.network.preload_amount
    }

    pub fn max_empty_pages(&self) -> usize {
        self.network.max_empty_pages
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(s).context("parsing settings toml")?;
        settings.sanitize();
        Ok(settings)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load settings using env var + fallbacks:
    /// 1) $FEDISCROLL_CONFIG
    /// 2) config/fediscroll.toml
    /// 3) built-in defaults
    ///
    /// `$FEDISCROLL_PRELOAD` then overrides the preload amount.
    pub fn load_default() -> Result<Self> {
        let mut settings = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };

        if let Some(n) = parse_preload_env(std::env::var(ENV_PRELOAD).ok()) {
            settings.network.preload_amount = n;
        }
        settings.sanitize();
        Ok(settings)
    }

    fn sanitize(&mut self) {
        // Zero would never trigger a top-up.
        if self.network.preload_amount == 0 {
            self.network.preload_amount = 1;
        }
        for inputs in self.feeds.values_mut() {
            inputs.retain(|s| !s.trim().is_empty());
            for s in inputs.iter_mut() {
                *s = s.trim().to_string();
            }
        }
    }
}

fn parse_preload_env(raw: Option<String>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
}
