//! Plain HTTP GET with a fixed per-request timeout.

use crate::context::Ctx;
use crate::error::{BlueprintError, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub trait Fetcher {
    /// GET `url` and return the body. Anything outside 2xx is a
    /// [`BlueprintError::Network`].
    fn get(&self, ctx: &Ctx, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("blueprint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BlueprintError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, ctx: &Ctx, url: &str) -> Result<Vec<u8>> {
        ctx.check()?;
        let timeout = match ctx.remaining() {
            Some(left) if left < REQUEST_TIMEOUT => left,
            _ => REQUEST_TIMEOUT,
        };
        tracing::debug!(%url, ?timeout, "fetching");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| BlueprintError::Network(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlueprintError::Network(format!("GET {url}: HTTP {status}")));
        }
        let body = response
            .bytes()
            .map_err(|e| BlueprintError::Network(format!("GET {url}: {e}")))?;
        ctx.check()?;
        Ok(body.to_vec())
    }
}

/// Serves canned bodies by exact URL; anything else is a 404.
#[derive(Debug, Default, Clone)]
pub struct MemFetcher {
    bodies: BTreeMap<String, Vec<u8>>,
}

impl MemFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }
}

impl Fetcher for MemFetcher {
    fn get(&self, ctx: &Ctx, url: &str) -> Result<Vec<u8>> {
        ctx.check()?;
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| BlueprintError::Network(format!("GET {url}: HTTP 404 Not Found")))
    }
}
