use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::cache::DocumentCache;

/// A single GET: URL, ordered query pairs, optional bearer credential.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
}

impl GetRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Performs the network side of a fetch. Swapped for a stub in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Response body of a successful GET. Non-success statuses are errors.
    async fn get(&self, request: &GetRequest) -> Result<String>;
}

#[async_trait]
impl<'a, T: Transport> Transport for &'a T {
    async fn get(&self, request: &GetRequest) -> Result<String> {
        (**self).get(request).await
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &GetRequest) -> Result<String> {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        let body = builder
            .send()
            .await
            .with_context(|| format!("GET {} failed", request.url))?
            .error_for_status()?
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", request.url))?;
        Ok(body)
    }
}

/// Fetches pages by URL through the page cache.
pub struct PageFetcher<T> {
    cache: DocumentCache,
    transport: T,
}

impl<T: Transport> PageFetcher<T> {
    pub fn new(cache: DocumentCache, transport: T) -> Self {
        Self { cache, transport }
    }

    /// Cached body for `url`, or GET it and write it through to the cache file.
    pub async fn fetch(&mut self, url: &str) -> Result<String> {
        if let Some(body) = self.cache.get(url) {
            debug!("Using cache: {}", url);
            return Ok(body.to_string());
        }

        info!("Fetching: {}", url);
        let body = self.transport.get(&GetRequest::new(url)).await?;
        self.cache.insert(url, body.as_str())?;
        Ok(body)
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned bodies by URL and records every request it sees.
    #[derive(Default)]
    pub struct StubTransport {
        pages: HashMap<String, String>,
        pub seen: Mutex<Vec<GetRequest>>,
    }

    impl StubTransport {
        pub fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn get(&self, request: &GetRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.pages
                .get(&request.url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 Not Found: {}", request.url))
        }
    }
}
