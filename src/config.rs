use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/client.json";
const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_AI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
const SESSION_DB_FILE: &str = "session.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_ai_api_url")]
    pub ai_api_url: String,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    /// Only ever read from `OPENAI_API_KEY`.
    #[serde(skip)]
    pub ai_api_key: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_ai_api_url() -> String {
    DEFAULT_AI_API_URL.to_string()
}

fn default_ai_model() -> String {
    DEFAULT_AI_MODEL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            data_dir: default_data_dir(),
            ai_api_url: default_ai_api_url(),
            ai_model: default_ai_model(),
            ai_api_key: None,
        }
    }
}

impl AppConfig {
    pub fn session_db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(SESSION_DB_FILE)
    }

    /// `CHAT_API_URL`, `CHAT_DATA_DIR`, `AI_API_URL`, `AI_MODEL` and
    /// `OPENAI_API_KEY` take precedence over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CHAT_API_URL") {
            self.api_url = url;
        }
        if let Some(dir) = lookup("CHAT_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Some(url) = lookup("AI_API_URL") {
            self.ai_api_url = url;
        }
        if let Some(model) = lookup("AI_MODEL") {
            self.ai_model = model;
        }
        self.ai_api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        self.api_url = self.api_url.trim_end_matches('/').to_string();
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let mut config = read_config_file(Path::new(path));
    config.apply_overrides(|key| env::var(key).ok());
    config
}

fn read_config_file(path: &Path) -> AppConfig {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}
