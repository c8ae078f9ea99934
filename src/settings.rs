use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::types::{ChainId, EndpointVersion};

/// Canonical Multicall3 deployment shared by almost every EVM chain.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// One supported chain and the messaging-layer endpoint ids used to reach it.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub key: String,
    pub chain_id: ChainId,
    #[serde(default)]
    pub eid_v1: Option<u32>,
    pub eid_v2: u32,
    /// Per-chain Multicall3 override (a handful of chains deploy it elsewhere).
    #[serde(default)]
    pub multicall_address: Option<Address>,
    #[serde(default)]
    pub rpcs: Vec<String>,
}

impl ChainConfig {
    fn new(key: &str, chain_id: ChainId, eid_v1: u32) -> Self {
        Self {
            key: key.to_string(),
            chain_id,
            eid_v1: Some(eid_v1),
            eid_v2: 30_000 + eid_v1,
            multicall_address: None,
            rpcs: Vec::new(),
        }
    }

    pub fn eid(&self, version: EndpointVersion) -> Option<u32> {
        match version {
            EndpointVersion::V1 => self.eid_v1,
            EndpointVersion::V2 => Some(self.eid_v2),
        }
    }
}

fn default_chains() -> Vec<ChainConfig> {
    vec![
        ChainConfig::new("ethereum", 1, 101),
        ChainConfig::new("arbitrum", 42161, 110),
        ChainConfig::new("base", 8453, 184),
        ChainConfig::new("bsc", 56, 102),
        ChainConfig::new("bera", 80094, 362),
        ChainConfig::new("optimism", 10, 111),
        ChainConfig::new("metis", 1088, 151),
        ChainConfig::new("avalanche", 43114, 106),
        ChainConfig::new("sonic", 146, 332),
        ChainConfig::new("polygon", 137, 109),
        ChainConfig::new("swell", 1923, 335),
        ChainConfig::new("fraxtal", 252, 255),
    ]
}

fn default_hub_chain_id() -> ChainId {
    42161 // Arbitrum One
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_chain_registry_url")]
    pub chain_registry_url: String,
    #[serde(default)]
    pub endpoint_cache_path: Option<String>,
    #[serde(default = "default_multicall_address")]
    pub multicall_address: Address,
}

fn default_batch_size() -> usize {
    500
}
fn default_batch_delay_ms() -> u64 {
    200
}
fn default_request_timeout_seconds() -> u64 {
    15
}
fn default_max_retries() -> usize {
    2
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_chain_registry_url() -> String {
    "https://chainid.network/chains.json".to_string()
}
fn default_multicall_address() -> Address {
    Address::from_str(MULTICALL3_ADDRESS).unwrap_or_default()
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            chain_registry_url: default_chain_registry_url(),
            endpoint_cache_path: None,
            multicall_address: default_multicall_address(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Discovery {
    /// Upper bound on discovery rounds; a well-formed peer graph settles long before this.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_max_rounds() -> usize {
    64
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Fees {
    #[serde(default = "default_hub_chain_id")]
    pub high_gas_chain_id: ChainId,
    #[serde(default = "default_high_gas_default")]
    pub high_gas_default: u64,
    #[serde(default = "default_min_dst_gas")]
    pub default_min_dst_gas: u64,
    /// `"<chainId>:<token address>" -> adapter address` fix-ups for known bad metadata.
    #[serde(default = "default_oft_adapter_overrides")]
    pub oft_adapter_overrides: HashMap<String, String>,
}

fn default_high_gas_default() -> u64 {
    2_000_000
}
fn default_min_dst_gas() -> u64 {
    200_000
}
fn default_oft_adapter_overrides() -> HashMap<String, String> {
    // USD₮0 on Arbitrum is registered against the token instead of its adapter.
    HashMap::from([(
        "42161:0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9".to_string(),
        "0x14E4A1B13bf7F943c8ff7C51fb60FA964A298D92".to_string(),
    )])
}

impl Default for Fees {
    fn default() -> Self {
        Self {
            high_gas_chain_id: default_hub_chain_id(),
            high_gas_default: default_high_gas_default(),
            default_min_dst_gas: default_min_dst_gas(),
            oft_adapter_overrides: default_oft_adapter_overrides(),
        }
    }
}

impl Fees {
    pub fn default_gas_for(&self, dst_chain: ChainId) -> u64 {
        if dst_chain == self.high_gas_chain_id {
            self.high_gas_default
        } else {
            self.default_min_dst_gas
        }
    }

    pub fn adapter_override(&self, chain_id: ChainId, token: &Address) -> Option<Address> {
        let key = format!("{}:{:?}", chain_id, token);
        self.oft_adapter_overrides
            .get(&key)
            .and_then(|a| Address::from_str(a.trim()).ok())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PegOverride {
    pub chain_name: String,
    pub address: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IdOverride {
    #[serde(default)]
    pub coingecko_id: Option<String>,
    #[serde(default)]
    pub coin_market_cap_id: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Reconcile {
    #[serde(default = "default_hub_active_limit")]
    pub hub_active_limit: usize,
    #[serde(default = "default_chain_active_limit")]
    pub chain_active_limit: usize,
    #[serde(default)]
    pub partner_symbols: Vec<String>,
    #[serde(default = "default_core_symbols")]
    pub core_symbols: Vec<String>,
    #[serde(default)]
    pub blocked_symbols: Vec<String>,
    #[serde(default)]
    pub chains_with_no_swapping: Vec<ChainId>,
    /// Chains supported by the list beyond the discovery chain table.
    #[serde(default)]
    pub extra_supported_chain_ids: Vec<ChainId>,
    /// `chainId -> { lowercase adapter -> replacement peer address }`.
    #[serde(default)]
    pub native_oft_adapters: HashMap<String, HashMap<String, String>>,
    #[serde(default = "default_peg_overrides")]
    pub peg_overrides: HashMap<String, PegOverride>,
    #[serde(default = "default_id_overrides")]
    pub id_overrides: HashMap<String, IdOverride>,
    #[serde(default = "default_list_name")]
    pub list_name: String,
    #[serde(default = "default_inactive_list_name")]
    pub inactive_list_name: String,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub list_logo_uri: Option<String>,
}

fn default_hub_active_limit() -> usize {
    20
}
fn default_chain_active_limit() -> usize {
    5
}
fn default_core_symbols() -> Vec<String> {
    ["USDC", "USDT", "USD₮0", "DAI", "WETH", "ETH", "WBTC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_peg_overrides() -> HashMap<String, PegOverride> {
    [
        ("USD₮0", "arbitrum", "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9"),
        ("frxUSD", "ethereum", "0xCAcd6fd266aF91b8AeD52aCCc382b4e165586E29"),
        ("sfrxUSD", "ethereum", "0xcf62F905562626CfcDD2261162a51fd02Fc9c5b6"),
    ]
    .into_iter()
    .map(|(symbol, chain_name, address)| {
        (
            symbol.to_string(),
            PegOverride {
                chain_name: chain_name.to_string(),
                address: address.to_string(),
            },
        )
    })
    .collect()
}
fn default_id_overrides() -> HashMap<String, IdOverride> {
    HashMap::from([
        (
            "frxUSD".to_string(),
            IdOverride {
                coingecko_id: Some("frax-usd".to_string()),
                coin_market_cap_id: Some(36039),
            },
        ),
        (
            "sfrxUSD".to_string(),
            IdOverride {
                coingecko_id: Some("staked-frax-usd".to_string()),
                coin_market_cap_id: Some(36038),
            },
        ),
    ])
}
fn default_list_name() -> String {
    "Omnichain Token List".to_string()
}
fn default_inactive_list_name() -> String {
    "Omnichain Inactive Token List".to_string()
}
fn default_keywords() -> Vec<String> {
    vec!["omnichain".to_string(), "default".to_string()]
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            hub_active_limit: default_hub_active_limit(),
            chain_active_limit: default_chain_active_limit(),
            partner_symbols: Vec::new(),
            core_symbols: default_core_symbols(),
            blocked_symbols: Vec::new(),
            chains_with_no_swapping: Vec::new(),
            extra_supported_chain_ids: Vec::new(),
            native_oft_adapters: HashMap::new(),
            peg_overrides: default_peg_overrides(),
            id_overrides: default_id_overrides(),
            list_name: default_list_name(),
            inactive_list_name: default_inactive_list_name(),
            keywords: default_keywords(),
            list_logo_uri: None,
        }
    }
}

impl Reconcile {
    pub fn is_blocked(&self, symbol: &str) -> bool {
        self.blocked_symbols.iter().any(|s| s == symbol)
    }

    pub fn is_allow_listed(&self, symbol: &str) -> bool {
        self.partner_symbols.iter().any(|s| s == symbol)
            || self.core_symbols.iter().any(|s| s == symbol)
    }

    pub fn active_limit(&self, chain_id: ChainId, hub_chain_id: ChainId) -> usize {
        if chain_id == hub_chain_id {
            self.hub_active_limit
        } else {
            self.chain_active_limit
        }
    }

    /// Replacement peer registered for a native-asset adapter, if any.
    pub fn native_oft_adapter(&self, chain_id: ChainId, adapter: &Address) -> Option<Address> {
        self.native_oft_adapters
            .get(&chain_id.to_string())
            .and_then(|m| m.get(&format!("{:?}", adapter)))
            .and_then(|a| Address::from_str(a.trim()).ok())
    }
}

/// File hand-off locations between stages.
#[derive(Debug, Deserialize, Clone)]
pub struct Paths {
    #[serde(default = "default_oft_metadata")]
    pub oft_metadata: String,
    #[serde(default = "default_baseline_tokens")]
    pub baseline_tokens: String,
    #[serde(default = "default_discovered_tokens")]
    pub discovered_tokens: String,
    #[serde(default = "default_enriched_tokens")]
    pub enriched_tokens: String,
    #[serde(default = "default_across_tokens")]
    pub across_tokens: String,
    #[serde(default = "default_registry_list")]
    pub registry_list: String,
    #[serde(default = "default_uniswap_list")]
    pub uniswap_list: String,
    #[serde(default = "default_wrapped_natives")]
    pub wrapped_natives: String,
    #[serde(default = "default_additional_tokens")]
    pub additional_tokens: String,
    /// Directory scanned for extra `TOKEN_LIST_*` files.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Uniswap-format lists whose records only ever land on the inactive list.
    #[serde(default = "default_inactive_sources")]
    pub inactive_sources: Vec<String>,
    /// OFT records demoted by the reconciler, handed to the inactive stage.
    #[serde(default = "default_demoted_tokens")]
    pub demoted_tokens: String,
    #[serde(default = "default_token_list")]
    pub token_list: String,
    #[serde(default = "default_inactive_token_list")]
    pub inactive_token_list: String,
}

fn default_oft_metadata() -> String {
    "output/ofts.json".to_string()
}
fn default_baseline_tokens() -> String {
    "output/filteredStargateTokens.json".to_string()
}
fn default_discovered_tokens() -> String {
    "output/discoveredTokens.json".to_string()
}
fn default_enriched_tokens() -> String {
    "output/enrichedTokens.json".to_string()
}
fn default_across_tokens() -> String {
    "output/filteredAcrossTokens.json".to_string()
}
fn default_registry_list() -> String {
    "output/ulysses.json".to_string()
}
fn default_uniswap_list() -> String {
    "output/uniswap.json".to_string()
}
fn default_wrapped_natives() -> String {
    "wrappedNatives.json".to_string()
}
fn default_additional_tokens() -> String {
    "additionalTokens.json".to_string()
}
fn default_output_dir() -> String {
    "output".to_string()
}
fn default_inactive_sources() -> Vec<String> {
    ["uni_extended", "compound", "set", "ba"]
        .iter()
        .map(|name| format!("output/{}.json", name))
        .collect()
}
fn default_demoted_tokens() -> String {
    "output/inactives.json".to_string()
}
fn default_token_list() -> String {
    "token-list.json".to_string()
}
fn default_inactive_token_list() -> String {
    "inactive-token-list.json".to_string()
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            oft_metadata: default_oft_metadata(),
            baseline_tokens: default_baseline_tokens(),
            discovered_tokens: default_discovered_tokens(),
            enriched_tokens: default_enriched_tokens(),
            across_tokens: default_across_tokens(),
            registry_list: default_registry_list(),
            uniswap_list: default_uniswap_list(),
            wrapped_natives: default_wrapped_natives(),
            additional_tokens: default_additional_tokens(),
            output_dir: default_output_dir(),
            inactive_sources: default_inactive_sources(),
            demoted_tokens: default_demoted_tokens(),
            token_list: default_token_list(),
            inactive_token_list: default_inactive_token_list(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub chains: Vec<ChainConfig>,
    pub hub_chain_id: ChainId,
    pub rpc: Rpc,
    pub discovery: Discovery,
    pub fees: Fees,
    pub reconcile: Reconcile,
    pub paths: Paths,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            hub_chain_id: default_hub_chain_id(),
            rpc: Rpc::default(),
            discovery: Discovery::default(),
            fees: Fees::default(),
            reconcile: Reconcile::default(),
            paths: Paths::default(),
        }
    }
}

impl Settings {
    /// Built-in defaults, overlaid with `Config.toml` (if present) and `TOKEN_LIST_*` env vars.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        if let Ok(raw) = env::var("TOKEN_LIST_HUB_CHAIN_ID") {
            if let Ok(id) = raw.trim().parse() {
                settings.hub_chain_id = id;
            }
        }
        if let Ok(url) = env::var("TOKEN_LIST_CHAIN_REGISTRY_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                settings.rpc.chain_registry_url = trimmed.to_string();
            }
        }
        if let Ok(path) = env::var("TOKEN_LIST_ENDPOINT_CACHE") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                settings.rpc.endpoint_cache_path = Some(trimmed.to_string());
            }
        }

        // Per-chain RPC overrides: TOKEN_LIST_RPC_URLS_<CHAINKEY>="[url1,url2]" are tried first.
        for chain in settings.chains.iter_mut() {
            let var = format!("TOKEN_LIST_RPC_URLS_{}", chain.key.to_ascii_uppercase());
            if let Ok(raw) = env::var(&var) {
                if let Some(list) = parse_string_list(&raw) {
                    let mut urls = list;
                    urls.extend(chain.rpcs.drain(..));
                    chain.rpcs = urls;
                }
            }
        }

        Ok(settings)
    }

    pub fn chain_by_key(&self, key: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.key.eq_ignore_ascii_case(key))
    }

    pub fn chain_by_id(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Chain ids accepted into the final lists.
    pub fn supported_chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self.chains.iter().map(|c| c.chain_id).collect();
        for id in &self.reconcile.extra_supported_chain_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Some(split_list(without_brackets));
    }

    Some(split_list(trimmed))
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_table_has_v2_offsets() {
        let settings = Settings::default();
        let arbitrum = settings.chain_by_key("arbitrum").unwrap();
        assert_eq!(arbitrum.chain_id, 42161);
        assert_eq!(arbitrum.eid(EndpointVersion::V1), Some(110));
        assert_eq!(arbitrum.eid(EndpointVersion::V2), Some(30110));
        assert_eq!(settings.chain_by_id(8453).unwrap().key, "base");
    }

    #[test]
    fn parses_string_lists_in_several_shapes() {
        assert_eq!(
            parse_string_list(r#"["https://a","https://b"]"#),
            Some(vec!["https://a".to_string(), "https://b".to_string()])
        );
        assert_eq!(
            parse_string_list("[https://a, https://b]"),
            Some(vec!["https://a".to_string(), "https://b".to_string()])
        );
        assert_eq!(
            parse_string_list("https://a"),
            Some(vec!["https://a".to_string()])
        );
        assert_eq!(parse_string_list("  "), Some(vec![]));
    }

    #[test]
    fn default_gas_depends_on_destination() {
        let fees = Fees::default();
        assert_eq!(fees.default_gas_for(42161), 2_000_000);
        assert_eq!(fees.default_gas_for(10), 200_000);
    }

    #[test]
    fn adapter_override_lookup_is_chain_qualified() {
        let fees = Fees::default();
        let token = Address::from_str("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9").unwrap();
        assert!(fees.adapter_override(42161, &token).is_some());
        assert!(fees.adapter_override(1, &token).is_none());
    }

    #[test]
    fn allow_list_covers_partner_and_core() {
        let mut reconcile = Reconcile::default();
        reconcile.partner_symbols.push("HERMES".to_string());
        assert!(reconcile.is_allow_listed("HERMES"));
        assert!(reconcile.is_allow_listed("USDC"));
        assert!(!reconcile.is_allow_listed("RANDOM"));
        assert_eq!(reconcile.active_limit(42161, 42161), 20);
        assert_eq!(reconcile.active_limit(10, 42161), 5);
    }
}
