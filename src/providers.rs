//! Third-party content search
//!
//! Thin proxies over TMDB, Google Books, Deezer and Jikan. Responses are
//! passed through as opaque JSON; the mobile client knows each provider's
//! shape.

use reqwest::Client;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::config::ProvidersConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Tmdb,
    GoogleBooks,
    Deezer,
    Jikan,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Tmdb => "TMDB",
            Provider::GoogleBooks => "Google Books",
            Provider::Deezer => "Deezer",
            Provider::Jikan => "Jikan",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trims the `q` parameter, rejecting it when missing or blank
pub fn search_term(q: Option<&str>) -> Result<&str> {
    q.map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::bad_request("Query parameter 'q' is required"))
}

/// HTTP client for every content provider
#[derive(Clone)]
pub struct SearchProviders {
    http: Client,
    config: ProvidersConfig,
}

impl SearchProviders {
    pub fn new(config: ProvidersConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("culturehub-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ProvidersConfig {
        &self.config
    }

    fn tmdb_key(&self) -> Result<&str> {
        self.config
            .tmdb_api_key
            .as_deref()
            .ok_or(Error::ProviderNotConfigured {
                provider: Provider::Tmdb.name(),
            })
    }

    /// Films and series trending this week
    #[instrument(skip(self))]
    pub async fn tmdb_trending(&self) -> Result<Value> {
        let key = self.tmdb_key()?;
        let url = format!("{}/trending/all/week", self.config.tmdb_base_url);
        self.get_json(
            Provider::Tmdb,
            &url,
            &[("api_key", key), ("language", self.config.tmdb_language.as_str())],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn tmdb_search(&self, query: &str) -> Result<Value> {
        let key = self.tmdb_key()?;
        let url = format!("{}/search/multi", self.config.tmdb_base_url);
        self.get_json(
            Provider::Tmdb,
            &url,
            &[
                ("api_key", key),
                ("query", query),
                ("language", self.config.tmdb_language.as_str()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn google_books_search(&self, query: &str) -> Result<Value> {
        let url = format!("{}/volumes", self.config.google_books_base_url);
        let limit = self.config.result_limit.to_string();
        let mut params = vec![("q", query), ("maxResults", limit.as_str())];
        if let Some(key) = self.config.google_books_api_key.as_deref() {
            params.push(("key", key));
        }
        self.get_json(Provider::GoogleBooks, &url, &params).await
    }

    #[instrument(skip(self))]
    pub async fn deezer_search(&self, query: &str) -> Result<Value> {
        let url = format!("{}/search", self.config.deezer_base_url);
        self.get_json(Provider::Deezer, &url, &[("q", query)]).await
    }

    #[instrument(skip(self))]
    pub async fn jikan_anime_search(&self, query: &str) -> Result<Value> {
        self.jikan_search("anime", query).await
    }

    #[instrument(skip(self))]
    pub async fn jikan_manga_search(&self, query: &str) -> Result<Value> {
        self.jikan_search("manga", query).await
    }

    async fn jikan_search(&self, kind: &str, query: &str) -> Result<Value> {
        let url = format!("{}/{}", self.config.jikan_base_url, kind);
        let limit = self.config.result_limit.to_string();
        self.get_json(Provider::Jikan, &url, &[("q", query), ("limit", limit.as_str())])
            .await
    }

    async fn get_json(
        &self,
        provider: Provider,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        debug!("GET {} ({})", url, provider);

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} responded with status {}", provider, status);
            return Err(Error::provider(
                provider.name(),
                format!("{} API responded with status: {}", provider, status.as_u16()),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| transport_error(provider, e))
    }
}

fn transport_error(provider: Provider, err: reqwest::Error) -> Error {
    warn!("{} request failed: {}", provider, err);
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_decode() {
        "response was not valid JSON".to_string()
    } else {
        "request could not be completed".to_string()
    };
    Error::provider(provider.name(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term() {
        assert_eq!(search_term(Some("  dune ")).unwrap(), "dune");
        assert!(search_term(Some("   ")).is_err());
        assert!(search_term(None).is_err());
    }

    #[tokio::test]
    async fn test_tmdb_requires_key() {
        let providers = SearchProviders::new(ProvidersConfig::default()).unwrap();
        let err = providers.tmdb_trending().await.unwrap_err();
        assert!(matches!(err, Error::ProviderNotConfigured { provider: "TMDB" }));
    }
}
