use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::cache::{FetchResult, Filters, QueryData, QueryKey, Resource};

use super::api_types::{ApiClick, ApiCreateLink, ApiErrorBody, ApiLink, ApiLinkStats, ApiPage};
use super::error::ApiError;
use super::types::{Click, Link, LinkId, LinkStats, NewLink, Page};

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  /// 1-based page index
  pub page: u32,
  pub page_size: u32,
  pub filters: Filters,
}

/// Request/response access to the link service.
///
/// One method per endpoint; implementations own the wire format.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn list_links(&self, request: &PageRequest) -> Result<Page<Link>, ApiError>;

  async fn create_link(&self, input: &NewLink) -> Result<Link, ApiError>;

  async fn get_link(&self, id: LinkId) -> Result<Link, ApiError>;

  async fn get_link_stats(&self, id: LinkId) -> Result<LinkStats, ApiError>;

  async fn list_clicks(&self, request: &PageRequest) -> Result<Page<Click>, ApiError>;
}

/// HTTP transport against the service's JSON API
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    // Url::join replaces the last path segment unless the base ends in '/'
    let mut base_url = base_url.clone();
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    Ok(Self { client, base_url })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path)
      .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
  }

  async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&'static str, String)],
  ) -> Result<T, ApiError> {
    let url = self.endpoint(path)?;
    debug!(%url, ?query, "GET");
    let response = self.client.get(url).query(query).send().await?;
    decode(response).await
  }
}

fn page_params(request: &PageRequest) -> Vec<(&'static str, String)> {
  vec![
    ("page", request.page.to_string()),
    ("pageSize", request.page_size.to_string()),
  ]
}

/// Decode a success body, or turn the server's `{"error": ...}` body into
/// a typed failure.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response.json::<T>().await?);
  }

  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<ApiErrorBody>(&body)
    .map(|b| b.error)
    .unwrap_or_else(|_| {
      status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
    });

  Err(ApiError::Server {
    status: status.as_u16(),
    message,
  })
}

#[async_trait]
impl Transport for HttpTransport {
  async fn list_links(&self, request: &PageRequest) -> Result<Page<Link>, ApiError> {
    let page: ApiPage<ApiLink> = self.get("links", &page_params(request)).await?;
    Ok(page.into_page())
  }

  async fn create_link(&self, input: &NewLink) -> Result<Link, ApiError> {
    let url = self.endpoint("links")?;
    debug!(%url, "POST");
    let response = self
      .client
      .post(url)
      .json(&ApiCreateLink::from(input))
      .send()
      .await?;
    let link: ApiLink = decode(response).await?;
    Ok(link.into())
  }

  async fn get_link(&self, id: LinkId) -> Result<Link, ApiError> {
    let link: ApiLink = self.get(&format!("links/{}", id), &[]).await?;
    Ok(link.into())
  }

  async fn get_link_stats(&self, id: LinkId) -> Result<LinkStats, ApiError> {
    let stats: ApiLinkStats = self.get(&format!("links/{}/stats", id), &[]).await?;
    Ok(stats.into())
  }

  async fn list_clicks(&self, request: &PageRequest) -> Result<Page<Click>, ApiError> {
    let mut params = page_params(request);
    params.extend(request.filters.query_params());
    let page: ApiPage<ApiClick> = self.get("clicks", &params).await?;
    Ok(page.into_page())
  }
}

/// Boxed fetch future handed to the query cache
pub type BoxFetch = Pin<Box<dyn Future<Output = FetchResult> + Send>>;

/// Cheaply cloneable handle that maps query keys onto transport calls
#[derive(Clone)]
pub struct ApiClient {
  transport: Arc<dyn Transport>,
}

impl ApiClient {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self { transport }
  }

  pub fn http(base_url: &Url, timeout: Duration) -> Result<Self> {
    Ok(Self::new(Arc::new(HttpTransport::new(base_url, timeout)?)))
  }

  /// Fetch whatever `key` describes, tagged with its payload shape
  pub async fn fetch(&self, key: &QueryKey) -> FetchResult {
    match key {
      QueryKey::Page {
        resource,
        page,
        page_size,
        filters,
      } => {
        let request = PageRequest {
          page: *page,
          page_size: *page_size,
          filters: filters.clone(),
        };
        match resource {
          Resource::Links => self
            .transport
            .list_links(&request)
            .await
            .map(QueryData::Links),
          Resource::Clicks => self
            .transport
            .list_clicks(&request)
            .await
            .map(QueryData::Clicks),
          _ => Err(ApiError::NoEndpoint(key.to_string())),
        }
      }
      QueryKey::Entity { resource, id } => match resource {
        Resource::Link => self.transport.get_link(*id).await.map(QueryData::Link),
        Resource::LinkStats => self
          .transport
          .get_link_stats(*id)
          .await
          .map(QueryData::LinkStats),
        _ => Err(ApiError::NoEndpoint(key.to_string())),
      },
    }
  }

  /// Fetch function for `QueryCache::resolve`
  pub fn fetcher(&self, key: QueryKey) -> impl FnOnce() -> BoxFetch {
    let client = self.clone();
    move || Box::pin(async move { client.fetch(&key).await })
  }

  pub async fn create_link(&self, input: &NewLink) -> Result<Link, ApiError> {
    self.transport.create_link(input).await
  }
}
