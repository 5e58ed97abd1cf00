use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

/// Startup configuration, read once from the environment (a `.env` file is
/// honored). Everything here is opaque to the core: endpoints and
/// credentials go straight to the service client, budgets and sampling go
/// into run options.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub bing_connection_name: Option<String>,
    pub max_completion_tokens: u32,
    pub max_prompt_tokens: u32,
    /// The model writes SQL; low temperature and top_p keep it
    /// deterministic.
    pub temperature: f32,
    pub top_p: f32,
    pub shared_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env::var("PROJECT_ENDPOINT").context("PROJECT_ENDPOINT must be set")?,
            api_key: env::var("PROJECT_API_KEY").context("PROJECT_API_KEY must be set")?,
            model: env::var("MODEL_DEPLOYMENT_NAME").unwrap_or_else(|_| "gpt-4o".to_string()),
            bing_connection_name: env::var("BING_CONNECTION_NAME").ok(),
            max_completion_tokens: parse_or(env::var("MAX_COMPLETION_TOKENS").ok(), 10240)
                .context("MAX_COMPLETION_TOKENS must be a number")?,
            max_prompt_tokens: parse_or(env::var("MAX_PROMPT_TOKENS").ok(), 20480)
                .context("MAX_PROMPT_TOKENS must be a number")?,
            temperature: parse_or(env::var("TEMPERATURE").ok(), 0.1)
                .context("TEMPERATURE must be a number")?,
            top_p: parse_or(env::var("TOP_P").ok(), 0.1).context("TOP_P must be a number")?,
            shared_dir: env::var("SHARED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("shared")),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.shared_dir.join("database").join("sales.db")
    }

    pub fn instructions_path(&self, name: &str) -> PathBuf {
        self.shared_dir.join("instructions").join(name)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.shared_dir.join("files")
    }

    pub fn fonts_path(&self) -> PathBuf {
        self.shared_dir.join("fonts").join("fonts.zip")
    }

    pub fn datasheet_path(&self) -> PathBuf {
        self.shared_dir.join("datasheet").join("product-datasheet.pdf")
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> Result<T, T::Err> {
    match value {
        Some(value) => value.trim().parse(),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_values_fall_back_to_defaults() {
        assert_eq!(parse_or::<u32>(None, 10240).unwrap(), 10240);
        assert_eq!(parse_or::<f32>(None, 0.1).unwrap(), 0.1);
    }

    #[test]
    fn present_values_are_parsed() {
        assert_eq!(parse_or::<u32>(Some("4096".into()), 10240).unwrap(), 4096);
        assert!(parse_or::<u32>(Some("lots".into()), 10240).is_err());
    }
}
