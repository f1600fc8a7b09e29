use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

pub const NEWS_API_KEY_VAR: &str = "NEWS_API_KEY";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Query shown in the search box before the visitor types anything
    #[serde(default = "default_query")]
    pub default_query: String,
    /// How many articles are rendered per search
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Cache lifetime for search results, in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_query() -> String {
    "Disney".to_string()
}

fn default_top_n() -> usize {
    10
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `GET /v2/everything` keyword search
    #[default]
    NewsApi,
    /// `POST /news` search with an `X-API-KEY` header
    Serper,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    #[serde(rename = "popularity")]
    Popularity,
    #[serde(rename = "publishedAt")]
    PublishedAt,
    #[serde(rename = "relevancy")]
    Relevancy,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Popularity => "popularity",
            SortBy::PublishedAt => "publishedAt",
            SortBy::Relevancy => "relevancy",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    /// Overrides the provider's public endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Country filter (`gl`), only used by Serper
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub sort_by: SortBy,
    /// Serper `tbs` time filter such as `qdr:w`
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_language() -> String {
    "ru".to_string()
}

fn default_country() -> String {
    "ru".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            language: default_language(),
            country: default_country(),
            sort_by: SortBy::default(),
            time_range: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl ProviderConfig {
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.kind) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, ProviderKind::NewsApi) => "https://newsapi.org",
            (None, ProviderKind::Serper) => "https://google.serper.dev",
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Secrets read from the environment. Either may be absent; each feature
/// checks for its own secret when it is used.
#[derive(Default)]
pub struct Secrets {
    pub news_api_key: Option<SecretString>,
    pub database_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            news_api_key: non_empty_env(NEWS_API_KEY_VAR).map(SecretString::from),
            database_url: non_empty_env(DATABASE_URL_VAR),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
