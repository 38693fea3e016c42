//! Fetch functions - talk to the upstream water-resources API

use crate::ingestion::parse::{items_to_records, PageError};
use crate::ingestion::table::Table;
use crate::ingestion::types::{PagePayload, Record};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";

/// Page of the upstream site whose visit primes the session cookies
const SESSION_PAGE: &[&str] = &["dataSet", ""];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned HTTP {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),
}

/// Shared handle on the upstream API.
///
/// Created once at startup and cloned into every handler; the inner
/// `reqwest::Client` holds the cookie jar and default headers for the
/// lifetime of the process. Nothing mutates it after construction.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
    request_timeout: Duration,
    lookup_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        lookup_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }

        let origin = base_url.origin().ascii_serialization();
        let referer = format!("{}/dataSet/", origin);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::ORIGIN,
            HeaderValue::from_str(&origin).map_err(|_| FetchError::InvalidUrl(origin.clone()))?,
        );
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(&referer).map_err(|_| FetchError::InvalidUrl(referer.clone()))?,
        );

        let http = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(UpstreamClient {
            http,
            base_url,
            request_timeout,
            lookup_timeout,
        })
    }

    /// Base URL extended with percent-encoded path segments
    pub fn endpoint<I>(&self, segments: I) -> Result<Url, FetchError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Visit the dataset page so the cookie jar holds a fresh session.
    /// Failure is logged and otherwise ignored.
    pub async fn refresh_session(&self) {
        let url = match self.endpoint(SESSION_PAGE) {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not build session URL: {}", e);
                return;
            }
        };

        let result = self
            .http
            .get(url)
            .timeout(self.lookup_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => debug!("Upstream session refreshed"),
            Err(e) => warn!("Could not initialize upstream session: {}", e),
        }
    }

    /// POST one page request: query string + form body, raw body text back
    pub async fn post_form(
        &self,
        url: &Url,
        query: &[(String, String)],
        body: &[(String, String)],
    ) -> Result<String, FetchError> {
        let response = self
            .http
            .post(url.clone())
            .query(query)
            .form(body)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(response.text().await?)
    }

    /// POST a JSON payload to a lookup endpoint and return the decoded body
    pub async fn post_json(&self, url: &Url, payload: &Value) -> Result<Value, FetchError> {
        let response = self
            .http
            .post(url.clone())
            .json(payload)
            .timeout(self.lookup_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| FetchError::Page(PageError::Decode(e)))
    }
}

/// One paginated request: fixed query string, form body without `page`
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub body: Vec<(String, String)>,
}

/// Why pagination ended
#[derive(Debug)]
pub enum StopReason {
    /// An empty page: the normal end of data
    Exhausted,
    /// The configured page cap was reached
    PageLimit(u32),
    /// A request or decode failure; earlier pages are kept
    Failed(FetchError),
}

/// Everything one paginated run collected
#[derive(Debug)]
pub struct PageRun {
    pub records: Vec<Record>,
    pub pages: u32,
    pub stop: StopReason,
}

impl PageRun {
    pub fn is_complete(&self) -> bool {
        !matches!(self.stop, StopReason::Failed(_))
    }

    /// Accumulated records as a table, or `None` if nothing was collected
    pub fn into_table(self) -> Option<Table> {
        if self.records.is_empty() {
            None
        } else {
            Some(Table::from_records(self.records))
        }
    }
}

/// Walk pages 0, 1, 2, ... until an empty page, a failure or the page cap
pub async fn fetch_paginated(
    client: &UpstreamClient,
    request: &PageRequest,
    max_pages: u32,
) -> PageRun {
    let mut records = Vec::new();
    let mut page: u32 = 0;
    let mut body = request.body.clone();
    body.push(("page".to_string(), String::new()));
    let page_slot = body.len() - 1;

    info!("Starting paginated download from {}", request.url);

    let stop = loop {
        if max_pages > 0 && page >= max_pages {
            warn!("Stopping after {} pages (page limit)", page);
            break StopReason::PageLimit(max_pages);
        }

        body[page_slot].1 = page.to_string();
        debug!("Fetching page {}", page);

        let items = match fetch_page(client, request, &body).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Stopping pagination at page {}: {}", page, e);
                break StopReason::Failed(e);
            }
        };

        if items.is_empty() {
            debug!("Page {} is empty, reached the last page", page);
            break StopReason::Exhausted;
        }

        records.extend(items_to_records(items));
        page += 1;
    };

    if records.is_empty() {
        info!("Pagination finished without collecting any records");
    } else {
        info!(
            "Download complete: {} records across {} pages",
            records.len(),
            page
        );
    }

    PageRun {
        records,
        pages: page,
        stop,
    }
}

async fn fetch_page(
    client: &UpstreamClient,
    request: &PageRequest,
    body: &[(String, String)],
) -> Result<Vec<Value>, FetchError> {
    let text = client.post_form(&request.url, &request.query, body).await?;
    let items = PagePayload::decode(&text)?.into_items()?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> UpstreamClient {
        UpstreamClient::new(base, Duration::from_secs(5), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = client("https://indiawris.gov.in");

        let url = client.endpoint(&["Dataset", "Ground Water Level"]).unwrap();

        assert_eq!(
            url.as_str(),
            "https://indiawris.gov.in/Dataset/Ground%20Water%20Level"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("http://127.0.0.1:9000/wris/");

        let url = client.endpoint(&["masterState", "StateList"]).unwrap();

        assert_eq!(url.as_str(), "http://127.0.0.1:9000/wris/masterState/StateList");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = UpstreamClient::new(
            "not a url",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));

        let result = UpstreamClient::new(
            "mailto:someone@example.com",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_empty_run_has_no_table() {
        let run = PageRun {
            records: Vec::new(),
            pages: 0,
            stop: StopReason::Exhausted,
        };

        assert!(run.is_complete());
        assert!(run.into_table().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_stops_with_network_error() {
        // Bind then drop a listener to get a port nobody is listening on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(&format!("http://{}", addr));
        let request = PageRequest {
            url: client.endpoint(&["Dataset", "x"]).unwrap(),
            query: Vec::new(),
            body: Vec::new(),
        };

        let run = fetch_paginated(&client, &request, 0).await;

        assert!(run.records.is_empty());
        assert!(matches!(run.stop, StopReason::Failed(FetchError::Network(_))));
        assert!(run.into_table().is_none());
    }
}
