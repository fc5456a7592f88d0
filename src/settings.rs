use crate::utils::Result;
use anyhow::Context;
use ini::{Ini, ParseOption, Properties};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_SETTINGS_FILE_PATH: &str = ".env";

// Earlier keys win when several are set.
const KEYS_BEARER_TOKEN: [&str; 4] = [
    "DOCSBOT_API_KEY",
    "API_KEY",
    "BEARER_TOKEN",
    "DOCSBOT_BEARER_TOKEN",
];
const KEYS_TEAM_ID: [&str; 2] = ["DOCSBOT_TEAM_ID", "TEAM_ID"];
const KEYS_BOT_ID: [&str; 2] = ["DOCSBOT_BOT_ID", "BOT_ID"];

// `param.region=eu` supplies a default for `:region`
const PARAM_KEY_PREFIX: &str = "param.";

pub const PARAM_TEAM_ID: &str = "teamId";
pub const PARAM_BOT_ID: &str = "botId";

/// Fallback values read from a key=value settings file. They only fill gaps:
/// an explicit token or path parameter from the caller always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    has_defaults: bool,
    bearer_token: Option<String>,
    path_params: HashMap<String, String>,
}

/// What `/api/config` reports. The token itself is never echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultsSummary {
    pub has_defaults: bool,
    pub has_bearer_token: bool,
    pub team_id: String,
    pub bot_id: String,
    pub path_defaults: BTreeMap<String, String>,
}

impl Defaults {
    pub fn new(bearer_token: Option<String>, path_params: HashMap<String, String>) -> Self {
        Defaults {
            has_defaults: true,
            bearer_token,
            path_params,
        }
    }

    /// Loads the top-level keys of `file_path`, or those of `[profile]`
    /// when a profile is named. A missing file yields empty defaults.
    pub fn load(file_path: &str, profile: Option<&str>) -> Result<Defaults> {
        let extended_path = shellexpand::tilde(file_path).to_string();
        if !Path::new(&extended_path).exists() {
            debug!("settings file not found: {extended_path}");
            return Ok(Defaults::default());
        }

        // values are taken literally, backslashes included
        let opt = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_file_opt(&extended_path, opt)
            .with_context(|| format!("Failed to read settings file {extended_path}"))?;
        let section = match profile {
            Some(name) => ini
                .section(Some(name))
                .with_context(|| format!("Profile [{name}] not found in {extended_path}"))?,
            None => ini.general_section(),
        };

        // a repeated key keeps its last line, even when that one is blank
        let mut path_params = section
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(PARAM_KEY_PREFIX)?;
                (!name.is_empty()).then(|| (name.to_string(), strip_wrapping_quotes(value)))
            })
            .collect::<HashMap<String, String>>();
        path_params.retain(|_, value| !value.is_empty());

        for (name, keys) in [(PARAM_TEAM_ID, &KEYS_TEAM_ID), (PARAM_BOT_ID, &KEYS_BOT_ID)] {
            if let Some(value) = first_non_empty(section, keys) {
                path_params.entry(name.to_string()).or_insert(value);
            }
        }

        let defaults = Defaults::new(first_non_empty(section, &KEYS_BEARER_TOKEN), path_params);
        debug!(
            has_bearer_token = defaults.bearer_token.is_some(),
            path_defaults = defaults.path_params.len(),
            "loaded settings from {extended_path}"
        );
        Ok(defaults)
    }

    #[cfg(test)]
    pub fn has_defaults(&self) -> bool {
        self.has_defaults
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    pub fn summary(&self) -> DefaultsSummary {
        DefaultsSummary {
            has_defaults: self.has_defaults,
            has_bearer_token: self.bearer_token.is_some(),
            team_id: self.path_param(PARAM_TEAM_ID).unwrap_or_default().to_string(),
            bot_id: self.path_param(PARAM_BOT_ID).unwrap_or_default().to_string(),
            path_defaults: self
                .path_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

fn first_non_empty(section: &Properties, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| section.get_all(key).last())
        .map(strip_wrapping_quotes)
        .find(|value| !value.is_empty())
}

fn strip_wrapping_quotes(value: &str) -> String {
    let trimmed = value.trim();
    let quoted = trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')));
    if quoted {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}
