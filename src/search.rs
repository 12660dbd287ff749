//! Rakuten Ichiba item-search API client.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Per-request network timeout; the only timeout in the pipeline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pinned response shape: with `formatVersion=2` the `Items` array holds the
/// product objects directly.
const FORMAT_VERSION: u32 = 2;

#[derive(Serialize)]
struct PageParams<'a> {
    #[serde(rename = "applicationId")]
    application_id: &'a str,
    keyword: &'a str,
    page: u32,
    hits: u32,
    #[serde(rename = "formatVersion")]
    format_version: u32,
    #[serde(rename = "shopCode", skip_serializing_if = "Option::is_none")]
    shop_code: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    /// Optional shop-scope filter; sent as `shopCode` when present.
    pub shop_code: Option<String>,
    /// Page size, sent as `hits`.
    pub hits: u32,
}

/// Seam over the paginated search endpoint so the collector can be exercised
/// without the live API.
#[async_trait]
pub trait SearchApi {
    /// Fetch one page of results. An empty vec signals the end of the result
    /// set.
    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<Value>>;
}

pub struct RakutenClient {
    http: Client,
    endpoint: String,
    app_id: String,
}

impl RakutenClient {
    pub fn new(app_id: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            app_id: app_id.into(),
        })
    }
}

#[async_trait]
impl SearchApi for RakutenClient {
    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<Value>> {
        let params = PageParams {
            application_id: &self.app_id,
            keyword: &query.keyword,
            page,
            hits: query.hits,
            format_version: FORMAT_VERSION,
            shop_code: query.shop_code.as_deref(),
        };

        info!(
            keyword = %query.keyword,
            page,
            shop_code = query.shop_code.as_deref().unwrap_or("-"),
            "searching"
        );

        let body: Value = self
            .http
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("search request failed (page {page})"))?
            .error_for_status()
            .with_context(|| format!("search request rejected (page {page})"))?
            .json()
            .await
            .with_context(|| format!("search response was not valid JSON (page {page})"))?;

        // Items are passed through verbatim; a missing array is the same as
        // an empty one.
        let items = body
            .get("Items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query(shop_code: Option<&str>) -> SearchQuery {
        SearchQuery {
            keyword: "laptop".into(),
            shop_code: shop_code.map(str::to_string),
            hits: 30,
        }
    }

    #[tokio::test]
    async fn sends_fixed_params_and_extracts_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("applicationId", "app-1"))
            .and(query_param("keyword", "laptop"))
            .and(query_param("page", "2"))
            .and(query_param("hits", "30"))
            .and(query_param("formatVersion", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [{"itemCode": "a"}, {"itemCode": "b"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RakutenClient::new("app-1", server.uri()).unwrap();
        let items = client.fetch_page(&query(None), 2).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["itemCode"], "a");
    }

    #[tokio::test]
    async fn includes_shop_code_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("shopCode", "shop-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Items": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RakutenClient::new("app-1", server.uri()).unwrap();
        let items = client.fetch_page(&query(Some("shop-9")), 1).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn missing_items_array_reads_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 0 })))
            .mount(&server)
            .await;

        let client = RakutenClient::new("app-1", server.uri()).unwrap();
        let items = client.fetch_page(&query(None), 1).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn http_error_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RakutenClient::new("app-1", server.uri()).unwrap();
        assert!(client.fetch_page(&query(None), 1).await.is_err());
    }
}
