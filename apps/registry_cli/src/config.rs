use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use client_core::RegistryClientConfig;
use serde::Deserialize;
use shared::domain::Address;

pub const DEFAULT_CONFIG_FILE: &str = "registry.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint_address: String,
    /// Accounts exposed by the simulated wallet; the first is active.
    pub identities: Vec<String>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".into(),
            identities: vec![
                "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
                "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into(),
            ],
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn client_config(&self) -> anyhow::Result<RegistryClientConfig> {
        RegistryClientConfig::new(&self.endpoint_address).map_err(|err| anyhow!(err))
    }

    pub fn wallet_identities(&self) -> anyhow::Result<Vec<Address>> {
        self.identities
            .iter()
            .map(|raw| {
                Address::parse(raw).with_context(|| format!("invalid wallet identity '{raw}'"))
            })
            .collect()
    }
}

/// Reads `path` (or `registry.toml` when absent) and layers environment overrides on top.
///
/// A missing default file is not an error; a missing explicit file is.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let settings = match fs::read_to_string(&path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(_) if !explicit => Settings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };

    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

pub fn apply_env_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    if let Some(v) = lookup("REGISTRY_ENDPOINT_ADDRESS") {
        settings.endpoint_address = v;
    }
    if let Some(v) = lookup("APP__ENDPOINT_ADDRESS") {
        settings.endpoint_address = v;
    }

    if let Some(v) = lookup("REGISTRY_IDENTITIES") {
        settings.identities = split_list(&v);
    }
    if let Some(v) = lookup("APP__IDENTITIES") {
        settings.identities = split_list(&v);
    }

    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
