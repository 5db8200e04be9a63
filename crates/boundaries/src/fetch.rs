use std::future::Future;
use std::pin::Pin;

use crate::DatasetError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Http(String),
    Status(u16),
    Dataset(DatasetError),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(msg) => write!(f, "boundary fetch failed: {msg}"),
            FetchError::Status(code) => write!(f, "boundary fetch returned HTTP {code}"),
            FetchError::Dataset(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Dataset(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DatasetError> for FetchError {
    fn from(e: DatasetError) -> Self {
        FetchError::Dataset(e)
    }
}

/// Downloads a boundary dataset as text.
pub trait BoundaryFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct HttpBoundaryFetcher {
    client: reqwest::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpBoundaryFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl BoundaryFetcher for HttpBoundaryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| FetchError::Http(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(FetchError::Status(resp.status().as_u16()));
            }

            resp.text()
                .await
                .map_err(|e| FetchError::Http(format!("read failed: {e}")))
        })
    }
}
