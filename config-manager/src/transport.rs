use crate::errors::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;

/// Status and collected body of a single GET.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// The HTTP surface the manager depends on.
///
/// Production wires [`ReqwestFetch`]; tests substitute a scripted
/// implementation. Timeouts are the transport's concern, not the manager's.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, TransportError>;
}

/// reqwest-backed transport.
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        ReqwestFetch {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<FetchResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(FetchResponse { status, body })
    }
}
