//! Load config from file and environment.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tbr_core::ip6::Prefix;
use tbr_core::netdata::{LowpanContext, OnMeshPrefixConfig};
use tbr_core::{StaticNetworkData, StaticRoutingContext, TrackerConfig};

/// Daemon configuration. File: ~/.config/tbr/config.toml or /etc/tbr/config.toml.
/// Env overrides: TBR_INFRA_IF, TBR_LOG_LEVEL, TBR_LOCAL_ON_LINK_PREFIX,
/// TBR_LOCAL_OMR_PREFIX.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Infrastructure interface name (default "eth0").
    #[serde(default = "default_infra_if")]
    pub infra_if: String,
    /// Default tracing filter when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// On-link prefix this border router advertises on the infra link.
    #[serde(default)]
    pub local_on_link_prefix: Option<Prefix>,
    /// OMR prefix this border router advertises in RIOs.
    #[serde(default)]
    pub local_omr_prefix: Option<Prefix>,
    /// Prefixes treated as OMR prefixes present in Thread Network Data.
    #[serde(default)]
    pub omr_prefixes: Vec<Prefix>,
    /// 6LoWPAN contexts used to expand compressed SRP host addresses.
    #[serde(default)]
    pub lowpan_contexts: Vec<LowpanContext>,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

fn default_infra_if() -> String {
    "eth0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            infra_if: default_infra_if(),
            log_level: default_log_level(),
            local_on_link_prefix: None,
            local_omr_prefix: None,
            omr_prefixes: Vec::new(),
            lowpan_contexts: Vec::new(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl Config {
    /// Routing context seen by the tracker. The local OMR prefix counts as
    /// advertised in our own RIOs.
    pub fn routing_context(&self) -> StaticRoutingContext {
        StaticRoutingContext {
            local_on_link_prefix: self.local_on_link_prefix,
            local_omr_prefix: self.local_omr_prefix,
            advertised_routes: self.local_omr_prefix.into_iter().collect(),
            network_data: StaticNetworkData {
                on_mesh_prefixes: self.omr_prefixes.iter().copied().map(OnMeshPrefixConfig::new).collect(),
                contexts: self.lowpan_contexts.clone(),
            },
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(s) = var("TBR_INFRA_IF") {
            self.infra_if = s;
        }
        if let Some(s) = var("TBR_LOG_LEVEL") {
            self.log_level = s;
        }
        if let Some(s) = var("TBR_LOCAL_ON_LINK_PREFIX") {
            if let Ok(p) = s.parse() {
                self.local_on_link_prefix = Some(p);
            }
        }
        if let Some(s) = var("TBR_LOCAL_OMR_PREFIX") {
            if let Ok(p) = s.parse() {
                self.local_omr_prefix = Some(p);
            }
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
/// A config file that exists but does not parse is an error.
pub fn load() -> anyhow::Result<Config> {
    let mut c = match config_path() {
        Some(path) => load_file(&path)?,
        None => Config::default(),
    };
    c.apply_env(|name| std::env::var(name).ok());
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/tbr/config.toml"));
    }
    out.push(PathBuf::from("/etc/tbr/config.toml"));
    out
}

/// First existing config file.
fn config_path() -> Option<PathBuf> {
    config_paths().into_iter().find(|p| p.exists())
}

fn load_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("invalid config file {}", path.display()))
}
