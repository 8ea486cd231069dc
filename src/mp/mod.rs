//! Materials Project client.
//!
//! Looks up the unit-cell structure of a material:
//! GET {endpoint}/materials/summary/?material_ids={mpid}&_fields=structure

mod cache;

pub use cache::StructureCache;

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::config::Config;
use crate::structure::{Structure, StructureError};

/// Errors that can occur while talking to the Materials Project.
#[derive(Error, Debug)]
pub enum MpError {
    #[error("no Materials Project API key (use --mapi-key, the config file, or PMG_MAPI_KEY)")]
    MissingApiKey,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by the Materials Project")]
    RateLimited,
    #[error("API key rejected (HTTP {0})")]
    Unauthorized(u16),
    #[error("material {0} not found")]
    NotFound(String),
    #[error("Materials Project unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected response: {0}")]
    Structure(#[from] StructureError),
}

/// Client for structure lookups.
pub struct MpClient {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    cache: Option<StructureCache>,
}

impl MpClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self, MpError> {
        let http = Client::builder()
            .user_agent(concat!("imdefects/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: StructureCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn summary_url(&self, mpid: &str) -> String {
        format!(
            "{}/materials/summary/?material_ids={}&_fields=structure,material_id",
            self.endpoint, mpid
        )
    }

    /// Fetch the structure of `mpid`, consulting the cache first.
    pub async fn fetch_structure(&self, mpid: &str) -> Result<Structure, MpError> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(mpid)) {
            log::info!("{}: using cached structure", mpid);
            return Ok(cached);
        }

        let url = self.summary_url(mpid);
        log::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("X-API-Key", self.api_key.as_str())
            .header("accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MpError::Timeout
                } else {
                    MpError::Network(e)
                }
            })?;

        let status = response.status().as_u16();
        if let Some(err) = status_error(status, mpid) {
            return Err(err);
        }

        let body: serde_json::Value = response.json().await?;
        let structure = structure_from_body(mpid, body)?;

        if let Some(cache) = &self.cache {
            cache.set(mpid, &structure);
        }

        Ok(structure)
    }
}

/// Extract the structure from a summary response; no documents means the
/// material does not exist.
fn structure_from_body(mpid: &str, body: serde_json::Value) -> Result<Structure, MpError> {
    Structure::from_value(body).map_err(|e| match e {
        StructureError::Empty => MpError::NotFound(mpid.to_string()),
        other => MpError::Structure(other),
    })
}

/// Map a non-success HTTP status to an error.
fn status_error(status: u16, mpid: &str) -> Option<MpError> {
    match status {
        200 => None,
        401 | 403 => Some(MpError::Unauthorized(status)),
        404 => Some(MpError::NotFound(mpid.to_string())),
        429 => Some(MpError::RateLimited),
        status => Some(MpError::Unavailable(format!("HTTP {}", status))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::NIAL_STRUCTURE;
    use serde_json::json;
    use tempfile::TempDir;

    fn nial_value() -> serde_json::Value {
        serde_json::from_str(NIAL_STRUCTURE).unwrap()
    }

    #[test]
    fn test_summary_url() {
        let config = Config {
            api_endpoint: "https://api.example.org/".to_string(),
            ..Default::default()
        };
        let client = MpClient::new(&config, "key".to_string()).unwrap();
        assert_eq!(
            client.summary_url("mp-1234"),
            "https://api.example.org/materials/summary/?material_ids=mp-1234&_fields=structure,material_id"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(200, "mp-1").is_none());
        assert!(matches!(
            status_error(401, "mp-1"),
            Some(MpError::Unauthorized(401))
        ));
        assert!(matches!(status_error(404, "mp-1"), Some(MpError::NotFound(id)) if id == "mp-1"));
        assert!(matches!(status_error(429, "mp-1"), Some(MpError::RateLimited)));
        assert!(matches!(
            status_error(503, "mp-1"),
            Some(MpError::Unavailable(msg)) if msg == "HTTP 503"
        ));
    }

    #[test]
    fn test_structure_from_body() {
        let body = json!({
            "data": [{"material_id": "mp-1487", "structure": nial_value()}],
            "meta": {"total_doc": 1}
        });
        let structure = structure_from_body("mp-1487", body).unwrap();
        assert_eq!(structure.formula(), "Al1 Ni1");

        let empty = json!({"data": [], "meta": {"total_doc": 0}});
        assert!(matches!(
            structure_from_body("mp-0", empty),
            Err(MpError::NotFound(id)) if id == "mp-0"
        ));

        let no_structure = json!({"data": [{"material_id": "mp-0"}]});
        assert!(matches!(
            structure_from_body("mp-0", no_structure),
            Err(MpError::NotFound(_))
        ));

        let garbage = json!({"data": [{"structure": {"sites": 3}}]});
        assert!(matches!(
            structure_from_body("mp-0", garbage),
            Err(MpError::Structure(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_structure_skips_request() {
        let temp = TempDir::new().unwrap();
        let cache = StructureCache::with_dir(Some(temp.path().to_path_buf()), 24);
        let structure = Structure::from_value(nial_value()).unwrap();
        cache.set("mp-1487", &structure);

        // nothing listens on the discard port
        let config = Config {
            api_endpoint: "http://127.0.0.1:9".to_string(),
            timeout_ms: 500,
            ..Default::default()
        };
        let client = MpClient::new(&config, "key".to_string())
            .unwrap()
            .with_cache(cache);

        assert_eq!(client.fetch_structure("mp-1487").await.unwrap(), structure);
        assert!(client.fetch_structure("mp-9999").await.is_err());
    }
}
