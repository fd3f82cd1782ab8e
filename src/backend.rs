use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::{info, warn};

use crate::config::Config;

/// Boundary to the content-parser service that crawls a repost request's
/// URL and discovers republications.
#[async_trait]
pub trait ParserService: Send + Sync {
    async fn process_request(&self, url: &str, level: i64) -> Result<ParseOutcome>;
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ParseOutcome {
    pub links_found: i64,
}

#[derive(Clone)]
pub struct ParserClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for ParserClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ParserClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.parser.base_url).context("invalid parser base URL")?;
        Ok(Self::with_base_url(
            cfg.parser.token.clone(),
            cfg.parser.version.clone(),
            base_url,
        ))
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("repost-watch/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            version,
        }
    }

    pub fn build_request(&self, url: &str, level: i64) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("parse")
            .context("invalid parser base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Parser-Version", &self.version)
            .header("Content-Type", "application/json")
            .json(&json!({ "url": url, "level": level }))
            .build()
            .context("failed to build parser request")
    }
}

#[async_trait]
impl ParserService for ParserClient {
    async fn process_request(&self, url: &str, level: i64) -> Result<ParseOutcome> {
        let request = self.build_request(url, level)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach parser service")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by parser service: {}", body);
            return Err(anyhow!("received 429 from parser service: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("parser service error - status: {}, body: {}", status, body);
            return Err(anyhow!("parser error {}: {}", status, body));
        }

        let outcome: ParseOutcome = res.json().await.context("invalid parser response JSON")?;
        info!(url, links = outcome.links_found, "parser accepted request");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_sets_headers() {
        let base = Url::parse("http://parser.local:8091/").unwrap();
        let client = ParserClient::with_base_url("token".into(), "v1".into(), base);
        let request = client.build_request("https://origin.example/post", 2).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/parse");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        assert_eq!(
            headers
                .get("Parser-Version")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "v1"
        );
    }

    #[test]
    fn build_request_carries_url_and_level() {
        let base = Url::parse("http://parser.local:8091/").unwrap();
        let client = ParserClient::with_base_url("token".into(), "v1".into(), base);
        let request = client.build_request("https://origin.example/post", 3).unwrap();

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(value["url"], "https://origin.example/post");
        assert_eq!(value["level"], 3);
    }
}
