use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A secret such as the news provider API key is not set.
    #[error("Missing credential: set the {0} environment variable")]
    MissingCredential(&'static str),

    #[error("Database is not configured: set the {0} environment variable")]
    MissingDatabaseUrl(&'static str),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("News API key is not configured (set {0})")]
    MissingCredential(&'static str),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("News API returned status {status}")]
    Api { status: u16, body: String },

    #[error("Unexpected response from news API: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Short text suitable for showing next to the search box.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::MissingCredential(var) => {
                format!("The news API key was not found. Make sure {} is set.", var)
            }
            FetchError::Network(e) => format!("Network error while contacting the news API: {}", e),
            FetchError::Api { status, body } => {
                let detail = api_error_detail(body);
                match detail {
                    Some(detail) => format!("The news API returned status {}: {}", status, detail),
                    None => format!("The news API returned status {}", status),
                }
            }
            FetchError::Malformed(detail) => {
                format!("The news API sent a response we could not read: {}", detail)
            }
        }
    }
}

/// Pulls the `message` field out of a provider error body when there is one.
fn api_error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not connect to the comment database: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    #[error("Comment database query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::ConnectionFailed(err),
            other => StoreError::Query(other),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter your name")]
    EmptyName,

    #[error("Please enter a comment")]
    EmptyBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_uses_provider_message() {
        let err = FetchError::Api {
            status: 401,
            body: r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#
                .to_string(),
        };
        assert_eq!(
            err.user_message(),
            "The news API returned status 401: Your API key is invalid."
        );
    }

    #[test]
    fn test_api_error_message_with_plain_body() {
        let err = FetchError::Api {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(err.user_message(), "The news API returned status 502");
    }

    #[test]
    fn test_pool_timeout_is_connection_failure() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::ConnectionFailed(_)));
    }

    #[test]
    fn test_row_not_found_is_query_failure() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[test]
    fn test_missing_url_wraps_config_error() {
        let err: StoreError = ConfigError::MissingDatabaseUrl("DATABASE_URL").into();
        assert_eq!(
            err.to_string(),
            "Database is not configured: set the DATABASE_URL environment variable"
        );
    }
}
