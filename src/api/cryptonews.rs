use reqwest::Client;
use serde::de::DeserializeOwned;

use super::types::*;
use crate::core::config::NewsConfig;
use crate::core::ProviderError;

const PROVIDER: &str = "cryptonews";

/// Page/size/sentiment knobs forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewsQuery {
    pub items: u32,
    pub page: u32,
    pub sentiment: Option<ProviderSentiment>,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            items: 50,
            page: 1,
            sentiment: None,
        }
    }
}

pub struct CryptoNewsClient {
    client: Client,
    config: NewsConfig,
}

impl CryptoNewsClient {
    pub fn new(config: NewsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, ProviderError> {
        if !self.has_credential() {
            return Err(ProviderError::MissingCredential { provider: PROVIDER });
        }

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        params.push(("token", self.config.api_key.clone()));

        tracing::debug!("GET {} ({} params)", url, params.len());

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;
        let status = response.status();

        if !status.is_success() {
            tracing::error!("CryptoNews API error: {} on {}", status, endpoint);
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(ProviderError::decode(PROVIDER))
    }

    /// Articles mentioning the given tickers. One ticker restricts the feed to that
    /// ticker only; several tickers match articles mentioning any of them.
    pub async fn get_ticker_news(
        &self,
        tickers: &[String],
        query: &NewsQuery,
    ) -> Result<Vec<RawArticle>, ProviderError> {
        let mut params = Vec::with_capacity(5);
        match tickers {
            [single] => params.push(("tickers-only", single.clone())),
            many => params.push(("tickers-include", many.join(","))),
        }
        params.push(("items", query.items.to_string()));
        params.push(("page", query.page.to_string()));
        if let Some(sentiment) = query.sentiment {
            params.push(("sentiment", sentiment.as_str().to_string()));
        }

        let response: RawNewsResponse = self.request("", params).await?;
        Ok(response.into_articles())
    }

    pub async fn get_general_news(
        &self,
        items: u32,
        page: u32,
    ) -> Result<Vec<RawArticle>, ProviderError> {
        let params = vec![
            ("section", "general".to_string()),
            ("items", items.to_string()),
            ("page", page.to_string()),
        ];
        let response: RawNewsResponse = self.request("/category", params).await?;
        Ok(response.into_articles())
    }

    /// Provider ticker database, passed through untouched.
    pub async fn get_tickers_db(&self) -> Result<serde_json::Value, ProviderError> {
        self.request("/account/tickersdbv2", Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: &str) -> CryptoNewsClient {
        CryptoNewsClient::new(NewsConfig {
            api_key: key.to_string(),
            base_url: server.uri(),
        })
    }

    #[tokio::test]
    async fn test_single_ticker_uses_tickers_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("tickers-only", "BTC"))
            .and(query_param("items", "50"))
            .and(query_param("page", "1"))
            .and(query_param("token", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"title": "BTC up", "news_url": "https://n.example/1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let articles = client_for(&server, "k")
            .get_ticker_news(&["BTC".to_string()], &NewsQuery::default())
            .await
            .unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title.as_deref(), Some("BTC up"));
    }

    #[tokio::test]
    async fn test_multiple_tickers_use_tickers_include() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("tickers-include", "BTC,ETH"))
            .and(query_param("sentiment", "negative"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let query = NewsQuery {
            sentiment: Some(ProviderSentiment::Negative),
            ..Default::default()
        };
        let articles = client_for(&server, "k")
            .get_ticker_news(&["BTC".to_string(), "ETH".to_string()], &query)
            .await
            .unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server, "k")
            .get_general_news(12, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_missing_key_never_calls_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, "")
            .get_tickers_db()
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }
}
