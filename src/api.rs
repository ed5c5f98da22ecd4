//! Remote fetch client for a PokeAPI-compatible endpoint.
//!
//! Every call is a single attempt: no retry, no backoff. The sync sequence
//! decides what a failure means.

use crate::decode::decode_record;
use crate::error::FetchError;
use crate::types::PokemonRecord;
use async_trait::async_trait;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://pokeapi.co/api/v2";

/// Where records and artwork come from.
#[async_trait]
pub trait PokedexSource: Send + Sync {
    async fn fetch_record(&self, id: u32) -> Result<PokemonRecord, FetchError>;
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    HTTP.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .user_agent(concat!("dex/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[api] falling back to default http client: {e}");
                reqwest::Client::new()
            })
    })
}

#[derive(Clone, Debug)]
pub struct HttpSource {
    base_url: String,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn record_url(&self, id: u32) -> String {
        format!("{}/pokemon/{}", self.base_url, id)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let res = http_client()
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        if !res.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: res.status().as_u16(),
            });
        }

        let body = res.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl PokedexSource for HttpSource {
    async fn fetch_record(&self, id: u32) -> Result<PokemonRecord, FetchError> {
        let url = self.record_url(id);
        log::debug!("[api] GET {url}");
        let body = self.get_bytes(&url).await?;
        decode_record(&body).map_err(|source| FetchError::Decode { id, source })
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("[api] GET {url}");
        self.get_bytes(url).await
    }
}
