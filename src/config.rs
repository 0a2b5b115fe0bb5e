use std::path::Path;

use serde::Deserialize;

use crate::cli::{Cli, Commands};
use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "claimchart.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub api_base_url: Option<String>,
    pub max_iterations: Option<u32>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub upstream_timeout: Option<u64>,
    pub max_source_chars: Option<usize>,
    pub listen_addr: Option<String>,
    pub allowed_origin: Option<String>,
    pub prompt_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model: String,
    pub api_key_env: String,
    pub api_base_url: String,
    pub max_iterations: u32,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub upstream_timeout: u64,
    pub max_source_chars: Option<usize>,
    pub listen_addr: String,
    pub allowed_origin: Option<String>,
    pub prompt_dir: Option<String>,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match &cli.config {
            Some(path) => {
                let config_path = Path::new(path);
                if !config_path.exists() {
                    return Err(Error::ConfigNotFound(config_path.to_path_buf()));
                }
                let content = std::fs::read_to_string(config_path)?;
                parse_config(&content)?
            }
            None => {
                let config_path = Path::new(DEFAULT_CONFIG_PATH);
                if config_path.exists() {
                    let content = std::fs::read_to_string(config_path)?;
                    parse_config(&content)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        merge(file_config, cli)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(iterations) = config.max_iterations
        && iterations == 0
    {
        return Err(Error::ConfigValidation(
            "max_iterations must be >= 1".to_string(),
        ));
    }
    if let Some(temperature) = config.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(Error::ConfigValidation(format!(
            "temperature must be between 0.0 and 2.0, got {temperature}"
        )));
    }
    if let Some(tokens) = config.max_output_tokens
        && tokens == 0
    {
        return Err(Error::ConfigValidation(
            "max_output_tokens must be > 0".to_string(),
        ));
    }
    if let Some(timeout) = config.upstream_timeout
        && timeout == 0
    {
        return Err(Error::ConfigValidation(
            "upstream_timeout must be > 0".to_string(),
        ));
    }
    if let Some(chars) = config.max_source_chars
        && chars == 0
    {
        return Err(Error::ConfigValidation(
            "max_source_chars must be > 0".to_string(),
        ));
    }
    Ok(())
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let listen = match &cli.command {
        Commands::Serve { listen } => listen.clone(),
        _ => None,
    };
    let config = Config {
        model: cli
            .model
            .clone()
            .or(file.model)
            .unwrap_or_else(|| "gemini-2.5-pro".to_string()),
        api_key_env: file
            .api_key_env
            .unwrap_or_else(|| "GOOGLE_API_KEY".to_string()),
        api_base_url: file.api_base_url.unwrap_or_else(|| {
            "https://generativelanguage.googleapis.com/v1beta".to_string()
        }),
        max_iterations: cli.max_iterations.or(file.max_iterations).unwrap_or(3),
        temperature: file.temperature.unwrap_or(0.1),
        max_output_tokens: file.max_output_tokens.unwrap_or(32_000),
        upstream_timeout: file.upstream_timeout.unwrap_or(300),
        max_source_chars: file.max_source_chars,
        listen_addr: listen
            .or(file.listen_addr)
            .unwrap_or_else(|| "127.0.0.1:8000".to_string()),
        allowed_origin: file.allowed_origin,
        prompt_dir: cli.prompt_dir.clone().or(file.prompt_dir),
    };
    // The CLI flag skips parse-time validation, so the merged value is
    // checked again here.
    if config.max_iterations == 0 {
        return Err(Error::ConfigValidation(
            "max_iterations must be >= 1".to_string(),
        ));
    }
    Ok(config)
}
