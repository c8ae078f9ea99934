use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::RpcError;
use crate::settings::{ChainConfig, Rpc};
use crate::types::ChainId;

#[derive(Debug, Deserialize)]
struct RegistryChain {
    #[serde(rename = "chainId")]
    chain_id: ChainId,
    #[serde(default)]
    rpc: Vec<String>,
}

/// Resolves the ordered list of candidate RPC URLs for a chain.
///
/// Statically configured endpoints come first, followed by the public chain registry
/// (read from the on-disk cache when present, otherwise fetched once and persisted).
pub struct EndpointResolver {
    http: reqwest::Client,
    registry_url: String,
    cache_path: Option<PathBuf>,
    registry: OnceCell<HashMap<ChainId, Vec<String>>>,
}

impl EndpointResolver {
    pub fn new(settings: &Rpc) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| RpcError::Registry(format!("building http client: {}", e)))?;
        Ok(Self {
            http,
            registry_url: settings.chain_registry_url.clone(),
            cache_path: settings.endpoint_cache_path.as_ref().map(PathBuf::from),
            registry: OnceCell::new(),
        })
    }

    /// A resolver that never consults the registry.
    pub fn offline() -> Self {
        let resolver = Self {
            http: reqwest::Client::new(),
            registry_url: String::new(),
            cache_path: None,
            registry: OnceCell::new(),
        };
        let _ = resolver.registry.set(HashMap::new());
        resolver
    }

    pub async fn candidates(&self, chain: &ChainConfig) -> Result<Vec<String>, RpcError> {
        let mut seen = HashSet::new();
        let mut urls: Vec<String> = chain
            .rpcs
            .iter()
            .filter(|u| is_usable_url(u))
            .filter(|u| seen.insert(u.to_string()))
            .cloned()
            .collect();

        match self.registry().await {
            Ok(registry) => {
                if let Some(extra) = registry.get(&chain.chain_id) {
                    for url in extra {
                        if is_usable_url(url) && seen.insert(url.clone()) {
                            urls.push(url.clone());
                        }
                    }
                }
            }
            Err(e) => warn!("chain registry unavailable for {}: {}", chain.key, e),
        }

        if urls.is_empty() {
            return Err(RpcError::NoEndpoints {
                chain: chain.key.clone(),
            });
        }
        debug!("{} candidate endpoints for {}", urls.len(), chain.key);
        Ok(urls)
    }

    async fn registry(&self) -> Result<&HashMap<ChainId, Vec<String>>, RpcError> {
        self.registry
            .get_or_try_init(|| async {
                if let Some(cached) = self.load_cache() {
                    return Ok(cached);
                }
                let fetched = self.fetch().await?;
                self.persist(&fetched);
                Ok(fetched)
            })
            .await
    }

    async fn fetch(&self) -> Result<HashMap<ChainId, Vec<String>>, RpcError> {
        info!("Fetching chain registry from {}", self.registry_url);
        let chains: Vec<RegistryChain> = self
            .http
            .get(&self.registry_url)
            .send()
            .await
            .map_err(|e| RpcError::Registry(e.to_string()))?
            .error_for_status()
            .map_err(|e| RpcError::Registry(e.to_string()))?
            .json()
            .await
            .map_err(|e| RpcError::Registry(e.to_string()))?;
        Ok(chains.into_iter().map(|c| (c.chain_id, c.rpc)).collect())
    }

    fn load_cache(&self) -> Option<HashMap<ChainId, Vec<String>>> {
        let path = self.cache_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(map) => {
                debug!("Loaded endpoint cache from {}", path.display());
                Some(map)
            }
            Err(e) => {
                warn!("Ignoring corrupt endpoint cache {}: {}", path.display(), e);
                None
            }
        }
    }

    fn persist(&self, registry: &HashMap<ChainId, Vec<String>>) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };
        match serde_json::to_string(registry) {
            Ok(body) => {
                if let Err(e) = std::fs::write(path, body) {
                    warn!("Failed to persist endpoint cache {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize endpoint cache: {}", e),
        }
    }
}

/// Registry entries include API-key templates (`${INFURA_API_KEY}`) and websocket URLs.
fn is_usable_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("https://") || url.starts_with("http://")) && !url.contains("${")
}
