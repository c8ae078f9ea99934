//! Turns the messaging-layer metadata file into discovery seeds.
//!
//! Each `addressToOApp` entry names an adapter contract. The adapter is either the token itself
//! (native) or a proxy whose metadata carries the wrapped `erc20TokenAddress`.

use ethers::types::Address;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

use crate::normalization::clean_address;
use crate::settings::{ChainConfig, Settings};
use crate::types::conversions::address_to_string;
use crate::types::{
    BridgeStatus, ChainId, EndpointVersion, Extensions, OftBridge, OftToken, OftVersion, TokenEntry,
    TokenKey,
};

/// Metadata file: chain key to per-chain metadata.
pub type OftMetadata = IndexMap<String, ChainMetadata>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainMetadata {
    #[serde(rename = "addressToOApp", default)]
    pub address_to_oapp: IndexMap<String, OAppInfo>,
    #[serde(default)]
    pub tokens: HashMap<String, TokenMetadata>,
    #[serde(default)]
    pub rpcs: Vec<RpcEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAppInfo {
    #[serde(default)]
    pub id: Option<Value>,
}

impl OAppInfo {
    fn group_key(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEntry {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeggedTo {
    pub chain_name: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    #[serde(default)]
    pub erc20_token_address: Option<String>,
    #[serde(default)]
    pub oft_version: Option<u8>,
    #[serde(default)]
    pub endpoint_version: Option<u8>,
    #[serde(default)]
    pub shared_decimals: Option<u8>,
    #[serde(default)]
    pub cg_id: Option<String>,
    #[serde(default)]
    pub cmc_id: Option<Value>,
    #[serde(default)]
    pub pegged_to: Option<PeggedTo>,
    #[serde(default)]
    pub fee: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

impl TokenMetadata {
    fn charges_fee(&self) -> bool {
        match &self.fee {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// An adapter and the ERC-20 it moves.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAdapter<'a> {
    pub adapter: Address,
    pub token: Address,
    pub metadata: Option<&'a TokenMetadata>,
}

/// Resolves one `addressToOApp` key against the chain's token metadata.
///
/// Returns `None` (after logging) for zero or malformed adapters and for proxies that point at
/// the zero address. Missing metadata is tolerated: the adapter is then assumed native.
pub fn resolve_adapter<'a>(
    chain_key: &str,
    raw_adapter: &str,
    tokens: &'a HashMap<String, TokenMetadata>,
) -> Option<ResolvedAdapter<'a>> {
    let adapter = match clean_address(raw_adapter) {
        Some(a) if !a.is_zero() => a,
        _ => {
            warn!("skipping zero-address adapter {} for chain {}", raw_adapter, chain_key);
            return None;
        }
    };

    let metadata = tokens.get(&address_to_string(adapter));
    if metadata.is_none() {
        warn!("no token info for adapter {:?} on chain {}", adapter, chain_key);
    }

    let token = match metadata.and_then(|m| m.erc20_token_address.as_deref()) {
        Some(raw) => clean_address(raw).unwrap_or(adapter),
        None => adapter,
    };
    if token.is_zero() {
        warn!("skipping zero-address token for adapter {:?} on chain {}", adapter, chain_key);
        return None;
    }

    Some(ResolvedAdapter {
        adapter,
        token,
        metadata,
    })
}

/// Appends RPC URLs advertised in the metadata file after each chain's configured ones.
pub fn apply_metadata_rpcs(chains: &mut [ChainConfig], metadata: &OftMetadata) {
    for chain in chains.iter_mut() {
        if let Some(meta) = metadata.get(&chain.key) {
            for entry in &meta.rpcs {
                if !chain.rpcs.contains(&entry.url) {
                    chain.rpcs.push(entry.url.clone());
                }
            }
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn peer_map(chain_id: ChainId, address: Address) -> Value {
    json!({ chain_id.to_string(): { "tokenAddress": format!("{:?}", address) } })
}

/// Builds the discovery seed set from the metadata file and the baseline token list.
pub fn build_seeds(settings: &Settings, metadata: &OftMetadata, baseline: &[TokenEntry]) -> Vec<OftToken> {
    let existing: HashMap<TokenKey, &TokenEntry> = baseline
        .iter()
        .filter_map(|e| e.key().map(|k| (k, e)))
        .collect();

    let mut seeds: Vec<OftToken> = Vec::new();
    // (peg address, peg chain key) -> chain -> pegged token
    let mut bridge_map: HashMap<(Address, String), Map<String, Value>> = HashMap::new();
    let mut oapp_groups: IndexMap<String, Vec<TokenKey>> = IndexMap::new();

    for chain in &settings.chains {
        let Some(chain_meta) = metadata.get(&chain.key) else {
            continue;
        };

        for (raw_adapter, oapp) in &chain_meta.address_to_oapp {
            let Some(resolved) = resolve_adapter(&chain.key, raw_adapter, &chain_meta.tokens) else {
                continue;
            };
            let key = TokenKey::new(chain.chain_id, resolved.token);
            let base = existing.get(&key).copied();
            let meta = resolved.metadata;

            let base_symbol = base.and_then(|b| non_empty(&b.symbol));
            let symbol = base_symbol.clone().or_else(|| meta.and_then(|m| m.symbol.clone()));
            let name = base
                .and_then(|b| non_empty(&b.name))
                .or_else(|| meta.and_then(|m| m.name.clone().or_else(|| m.symbol.clone())));
            let decimals = base.map(|b| b.decimals).or_else(|| meta.and_then(|m| m.decimals));

            let mut ids = Extensions::new();
            if let Some(cg) = meta.and_then(|m| m.cg_id.clone()) {
                ids.insert("coingeckoId", Value::String(cg));
            }
            if let Some(cmc) = meta.and_then(|m| m.cmc_id.clone()).filter(|v| !v.is_null()) {
                ids.insert("coinMarketCapId", cmc);
            }
            if let Some(o) = symbol.as_deref().and_then(|s| settings.reconcile.id_overrides.get(s)) {
                if let Some(cg) = &o.coingecko_id {
                    ids.insert("coingeckoId", Value::String(cg.clone()));
                }
                if let Some(cmc) = o.coin_market_cap_id {
                    ids.insert("coinMarketCapId", json!(cmc));
                }
            }
            let mut extensions = base
                .map(|b| b.extensions.clone())
                .unwrap_or_default()
                .merge(&ids);

            let peg = base_symbol
                .as_deref()
                .and_then(|s| settings.reconcile.peg_overrides.get(s))
                .map(|p| (p.chain_name.clone(), Some(p.address.clone())))
                .or_else(|| {
                    meta.and_then(|m| m.pegged_to.as_ref())
                        .map(|p| (p.chain_name.clone(), p.address.clone()))
                });
            if let Some((peg_chain, Some(peg_raw))) = peg {
                if let Some(peg_address) = clean_address(&peg_raw) {
                    bridge_map
                        .entry((peg_address, peg_chain.clone()))
                        .or_default()
                        .insert(
                            chain.chain_id.to_string(),
                            json!({ "tokenAddress": format!("{:?}", resolved.token) }),
                        );
                    if let Some(peg_chain_cfg) = settings.chain_by_key(&peg_chain) {
                        let mut bridge = Extensions::new();
                        bridge.insert("bridgeInfo", peer_map(peg_chain_cfg.chain_id, peg_address));
                        extensions = extensions.merge(&bridge);
                    }
                }
            }

            if let Some(group) = oapp.group_key() {
                oapp_groups.entry(group).or_default().push(key);
            }

            let mut bridge = OftBridge::new(resolved.adapter);
            if let Some(m) = meta {
                bridge.oft_version = m.oft_version.and_then(|v| OftVersion::try_from(v).ok());
                bridge.endpoint_version = m
                    .endpoint_version
                    .and_then(|v| EndpointVersion::try_from(v).ok());
                bridge.shared_decimals = m.shared_decimals;
                bridge.fee_flag = m.charges_fee();
            }

            seeds.push(OftToken {
                chain_key: chain.key.clone(),
                chain_id: chain.chain_id,
                address: resolved.token,
                name,
                symbol,
                decimals,
                icon: base.and_then(|b| b.logo_uri.clone()),
                extensions,
                bridge: BridgeStatus::BridgeToken(bridge),
                rest: base.map(|b| b.rest.clone()).unwrap_or_default(),
            });
        }
    }

    // Reverse peg links: the pegged-to token learns every chain that wraps it.
    for seed in seeds.iter_mut() {
        if let Some(reverse) = bridge_map.get(&(seed.address, seed.chain_key.clone())) {
            let mut bridge = Extensions::new();
            bridge.insert("bridgeInfo", Value::Object(reverse.clone()));
            seed.extensions = seed.extensions.merge(&bridge);
        }
    }

    // Adapters registered under the same application id are peers of each other.
    for seed in seeds.iter_mut() {
        let key = seed.key();
        let mut linked: BTreeMap<ChainId, Address> = BTreeMap::new();
        for members in oapp_groups.values() {
            if !members.contains(&key) {
                continue;
            }
            for other in members.iter().filter(|m| m.chain_id != key.chain_id) {
                linked.insert(other.chain_id, other.address);
            }
        }
        if let Some(bridge) = seed.bridge.bridge_mut() {
            bridge.peers.extend(linked);
        }
    }

    debug!("Built {} discovery seeds", seeds.len());
    seeds
}
