use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// HTTP client that waits a fixed delay before every request.
pub struct PoliteClient {
    client: Client,
    delay: Duration,
}

impl PoliteClient {
    pub fn new(
        user_agent: &str,
        delay: Duration,
        cookies: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&cookie).context("Invalid cookie value")?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, delay })
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        if !self.delay.is_zero() {
            debug!(delay = ?self.delay, "sleeping before request");
            tokio::time::sleep(self.delay).await;
        }

        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        debug!("Downloaded {} bytes", body.len());
        Ok(body)
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::parse(url, e.to_string()))
    }
}
