//! REST transport for a remote paginated collection.
//!
//! The collection is addressed as `{base_url}/{resource}`:
//! - `GET  {base}/{resource}?start=&limit=` returns `{ "data": [...], "totalElements": n }`
//! - `POST {base}/{resource}/execute` triggers a resync
//! - `DELETE {base}/{resource}/truncate` empties the collection

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{check_range, PaginatedSource, RangeResponse, SourceError, SourceResult};

/// Wire format of a range response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginatedResponse<R> {
    data: Vec<R>,
    #[serde(default)]
    total_elements: usize,
}

/// HTTP-backed [`PaginatedSource`]
#[derive(Debug, Clone)]
pub struct HttpSource<R> {
    client: Client,
    base_url: String,
    resource: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> HttpSource<R> {
    /// Create a source for `{base_url}/{resource}` with a per-request timeout
    pub fn new(base_url: &str, resource: &str, timeout: Duration) -> SourceResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, resource))
    }

    /// Create a source reusing an existing client
    pub fn with_client(client: Client, base_url: &str, resource: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            resource: resource.trim_matches('/').to_string(),
            _record: PhantomData,
        }
    }

    /// URL of the collection itself
    pub fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.resource)
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/{}", self.collection_url(), action)
    }
}

/// Turn a non-success response into a [`SourceError::Status`]
async fn check_status(response: Response) -> SourceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.text().await {
        Ok(text) => extract_error_message(&text),
        Err(_) => "Failed to read error response".to_string(),
    };
    Err(SourceError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Pull a readable message out of an error body, JSON or not
fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let message = json
            .get("message")
            .or_else(|| json.get("error").and_then(|e| e.get("message")))
            .or_else(|| json.get("error"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        "empty response body".to_string()
    } else {
        body.trim().to_string()
    }
}

#[async_trait]
impl<R> PaginatedSource<R> for HttpSource<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn fetch_range(&self, start: usize, count: usize) -> SourceResult<RangeResponse<R>> {
        check_range(start, count)?;

        let url = self.collection_url();
        debug!("GET {} start={} limit={}", url, start, count);

        let response = self
            .client
            .get(&url)
            .query(&[("start", start), ("limit", count)])
            .send()
            .await?;
        let body: PaginatedResponse<R> = check_status(response).await?.json().await?;

        Ok(RangeResponse::new(body.data, body.total_elements))
    }

    async fn execute(&self) -> SourceResult<()> {
        let url = self.action_url("execute");
        debug!("POST {}", url);

        let response = self.client.post(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        let url = self.action_url("truncate");
        debug!("DELETE {}", url);

        let response = self.client.delete(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.collection_url()
    }
}
