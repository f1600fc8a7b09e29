use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ProviderConfig, ProviderKind, NEWS_API_KEY_VAR};
use crate::error::FetchError;
use crate::timestamp::{parse_published, Timestamp};

/// NewsAPI replaces taken-down articles with this placeholder.
const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    TitleOnly,
    #[default]
    FullText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub source_name: String,
    pub author: Option<String>,
    pub published_at: Option<Timestamp>,
    pub description: Option<String>,
    pub url: String,
}

/// Anything that can answer a news search. The cache is generic over this
/// so tests can count calls.
pub trait ArticleSource: Send + Sync {
    fn fetch(
        &self,
        query: &str,
        mode: SearchMode,
    ) -> impl Future<Output = Result<Vec<Article>, FetchError>> + Send;
}

pub struct NewsClient {
    client: Client,
    provider: ProviderConfig,
    api_key: Option<SecretString>,
}

impl NewsClient {
    pub fn new(
        provider: ProviderConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(provider.timeout_secs))
            .user_agent("Newsboard/1.0 (News Dashboard)")
            .build()?;

        Ok(Self {
            client,
            provider,
            api_key,
        })
    }

    async fn fetch_news_api(
        &self,
        key: &str,
        query: &str,
        mode: SearchMode,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/v2/everything", self.provider.base_url());
        let query_param = match mode {
            SearchMode::TitleOnly => "qInTitle",
            SearchMode::FullText => "q",
        };

        let request = self.client.get(&url).query(&[
            (query_param, query),
            ("language", self.provider.language.as_str()),
            ("sortBy", self.provider.sort_by.as_str()),
            ("apiKey", key),
        ]);

        send(request).await
    }

    async fn fetch_serper(
        &self,
        key: &str,
        query: &str,
        mode: SearchMode,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/news", self.provider.base_url());
        let q = match mode {
            SearchMode::TitleOnly => format!("intitle:{}", query),
            SearchMode::FullText => query.to_string(),
        };
        let body = SerperRequest {
            q: &q,
            gl: &self.provider.country,
            hl: &self.provider.language,
            tbs: self.provider.time_range.as_deref(),
        };

        let request = self
            .client
            .post(&url)
            .header("X-API-KEY", key)
            .json(&body);

        send(request).await
    }
}

impl ArticleSource for NewsClient {
    async fn fetch(&self, query: &str, mode: SearchMode) -> Result<Vec<Article>, FetchError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or(FetchError::MissingCredential(NEWS_API_KEY_VAR))?;

        info!(
            "Searching news: '{}' ({:?}, {:?})",
            query, mode, self.provider.kind
        );

        let (body, field) = match self.provider.kind {
            ProviderKind::NewsApi => (
                self.fetch_news_api(key.expose_secret(), query, mode).await?,
                "articles",
            ),
            ProviderKind::Serper => (
                self.fetch_serper(key.expose_secret(), query, mode).await?,
                "news",
            ),
        };

        let articles = normalize(self.provider.kind, body, field)?;
        info!("Found {} articles for '{}'", articles.len(), query);
        Ok(articles)
    }
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    title: Option<String>,
    source: Option<NewsApiSource>,
    author: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

#[derive(Deserialize)]
struct SerperArticle {
    title: Option<String>,
    source: Option<String>,
    date: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, FetchError> {
    let response = request.send().await.map_err(FetchError::Network)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("News API returned status {}", status.as_u16());
        return Err(FetchError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await.map_err(FetchError::Network)?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Map the provider's list field onto `Article`s. A missing field means no
/// results; a single unusable entry is skipped, never the whole batch.
fn normalize(
    kind: ProviderKind,
    mut body: Value,
    field: &str,
) -> Result<Vec<Article>, FetchError> {
    let entries = match body.get_mut(field).map(Value::take) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(FetchError::Malformed(format!(
                "field '{}' is not a list",
                field
            )))
        }
    };

    let now = Utc::now();
    let mut articles = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for entry in entries {
        let article = match kind {
            ProviderKind::NewsApi => serde_json::from_value::<NewsApiArticle>(entry)
                .ok()
                .and_then(|raw| from_news_api(raw, now)),
            ProviderKind::Serper => serde_json::from_value::<SerperArticle>(entry)
                .ok()
                .and_then(|raw| from_serper(raw, now)),
        };

        match article {
            Some(article) => {
                if article.published_at.as_ref().is_some_and(Timestamp::is_unknown) {
                    warn!("Unparsable publish date on '{}'", article.title);
                }
                articles.push(article);
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} unusable entries in news response", skipped);
    }

    Ok(articles)
}

fn from_news_api(raw: NewsApiArticle, now: chrono::DateTime<Utc>) -> Option<Article> {
    let title = non_blank(raw.title)?;
    let url = web_link(raw.url)?;
    if title == REMOVED_MARKER {
        return None;
    }

    Some(Article {
        title,
        source_name: raw
            .source
            .and_then(|s| non_blank(s.name))
            .unwrap_or_else(|| "Unknown source".to_string()),
        author: non_blank(raw.author),
        published_at: non_blank(raw.published_at).map(|p| parse_published(&p, now)),
        description: non_blank(raw.description),
        url,
    })
}

fn from_serper(raw: SerperArticle, now: chrono::DateTime<Utc>) -> Option<Article> {
    Some(Article {
        title: non_blank(raw.title)?,
        source_name: non_blank(raw.source).unwrap_or_else(|| "Unknown source".to_string()),
        author: None,
        published_at: non_blank(raw.date).map(|d| parse_published(&d, now)),
        description: non_blank(raw.snippet),
        url: web_link(raw.link)?,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Only http(s) links end up in an `href`.
fn web_link(value: Option<String>) -> Option<String> {
    non_blank(value).filter(|v| {
        reqwest::Url::parse(v).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
    })
}
