use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DEFAULT_BASE_URL, DEFAULT_MODEL, SamplingParams};
use crate::storage::DEFAULT_AUDIT_CAPACITY;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// One configuration layer. Unset fields fall through to the next layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GatewaySettings {
    pub model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub api_base_url: Option<String>,
    pub audit_capacity: Option<usize>,
}

impl GatewaySettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|source| SettingsError::Read { path: path.display().to_string(), source })?;
        serde_json::from_str(&data).map_err(|source| SettingsError::Parse { path: path.display().to_string(), source })
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a layer from an arbitrary key lookup, so tests need not touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let temperature = parse_env(&lookup, "ORACLE_TEMPERATURE")?;
        let top_p = parse_env(&lookup, "ORACLE_TOP_P")?;
        let top_k = parse_env(&lookup, "ORACLE_TOP_K")?;
        let model_params = if temperature.is_some() || top_p.is_some() || top_k.is_some() {
            Some(ModelParams { temperature, top_p, top_k })
        } else {
            None
        };
        Ok(Self {
            model: lookup("ORACLE_MODEL"),
            model_params,
            api_base_url: lookup("GEMINI_BASE_URL"),
            audit_capacity: parse_env(&lookup, "ORACLE_AUDIT_CAPACITY")?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, SettingsError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SettingsError::InvalidEnv { key, value: raw }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub sampling: SamplingParams,
    pub api_base_url: String,
    pub audit_capacity: usize,
}

pub fn resolve_effective_settings(
    file: &GatewaySettings,
    env: &GatewaySettings,
    cli: &GatewaySettings,
) -> EffectiveSettings {
    let layers = [cli, env, file];
    let defaults = SamplingParams::default();

    let model = layers
        .iter()
        .find_map(|l| l.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let sampling = SamplingParams {
        temperature: layers
            .iter()
            .find_map(|l| l.model_params.as_ref().and_then(|p| p.temperature))
            .unwrap_or(defaults.temperature),
        top_p: layers
            .iter()
            .find_map(|l| l.model_params.as_ref().and_then(|p| p.top_p))
            .unwrap_or(defaults.top_p),
        top_k: layers
            .iter()
            .find_map(|l| l.model_params.as_ref().and_then(|p| p.top_k))
            .unwrap_or(defaults.top_k),
    };

    let api_base_url = layers
        .iter()
        .find_map(|l| l.api_base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let audit_capacity = layers
        .iter()
        .find_map(|l| l.audit_capacity)
        .unwrap_or(DEFAULT_AUDIT_CAPACITY);

    EffectiveSettings { model, sampling, api_base_url, audit_capacity }
}
