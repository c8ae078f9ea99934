//! Shapes of the independently produced lists fed into the reconciler.

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::PipelineError;
use crate::normalization::clean_address;
use crate::settings::Paths;
use crate::snapshot;
use crate::types::{AcrossInfo, ChainId, Extensions, OftToken, TokenEntry, TokenKey};
use ethers::types::Address;

/// Prefix of extra list files picked up from the output directory.
pub const EXTRA_LIST_PREFIX: &str = "TOKEN_LIST_";

/// One symbol of the Across-style token map.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcrossToken {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub addresses: IndexMap<String, AcrossAddress>,
    #[serde(default)]
    pub coingecko_id: Option<String>,
    #[serde(rename = "logoURI", default)]
    pub logo_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcrossAddress {
    pub address: String,
    /// Present only where the deployment diverges from the symbol's decimals.
    #[serde(default)]
    pub decimals: Option<u8>,
}

pub type AcrossTokens = IndexMap<String, AcrossToken>;

/// Cross-chain registry whose `tokens` are keyed by `underlyingAddress`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryList {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub root_tokens: Vec<TokenEntry>,
}

impl RegistryList {
    /// Whether any registry record sits at `key`, by address or underlying address.
    pub fn contains(&self, key: &TokenKey) -> bool {
        self.tokens
            .iter()
            .chain(self.root_tokens.iter())
            .any(|t| t.chain_id == key.chain_id && t.keys().contains(key))
    }
}

/// Everything the reconciler merges, already parsed.
#[derive(Debug, Clone, Default)]
pub struct ReconcileInputs {
    pub across: AcrossTokens,
    pub ofts: Vec<OftToken>,
    pub registry: RegistryList,
    pub uniswap: Vec<TokenEntry>,
    pub wrapped_natives: Vec<TokenEntry>,
    pub additional: Vec<TokenEntry>,
    /// `TOKEN_LIST_*` files, in file-name order.
    pub extra_lists: Vec<Vec<TokenEntry>>,
}

impl ReconcileInputs {
    /// The Across map and the enriched OFT snapshot are required; every other source is
    /// optional and read as empty when its file is absent.
    pub fn load(paths: &Paths) -> Result<Self, PipelineError> {
        let across: AcrossTokens = snapshot::read_json(&paths.across_tokens)?;
        let ofts: Vec<OftToken> = snapshot::read_json(&paths.enriched_tokens)?;
        let registry: RegistryList = snapshot::read_optional(&paths.registry_list)?.unwrap_or_default();

        let list = |path: &str| -> Result<Vec<TokenEntry>, PipelineError> {
            Ok(snapshot::read_optional::<Value>(path)?
                .map(parse_token_list)
                .unwrap_or_default())
        };

        let inputs = Self {
            across,
            ofts,
            registry,
            uniswap: list(&paths.uniswap_list)?,
            wrapped_natives: list(&paths.wrapped_natives)?,
            additional: list(&paths.additional_tokens)?,
            extra_lists: load_extra_lists(Path::new(&paths.output_dir))?,
        };
        info!(
            "Loaded {} Across symbols, {} OFT records, {} registry records, {} extra lists",
            inputs.across.len(),
            inputs.ofts.len(),
            inputs.registry.tokens.len() + inputs.registry.root_tokens.len(),
            inputs.extra_lists.len()
        );
        Ok(inputs)
    }
}

fn load_extra_lists(dir: &Path) -> Result<Vec<Vec<TokenEntry>>, PipelineError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No extra lists in {}: {}", dir.display(), e);
            return Ok(Vec::new());
        }
    };
    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(EXTRA_LIST_PREFIX))
        })
        .collect();
    files.sort();

    let mut lists = Vec::with_capacity(files.len());
    for file in files {
        match snapshot::read_json::<Value>(&file) {
            Ok(raw) => lists.push(parse_token_list(raw)),
            Err(e) => warn!("Skipping unreadable list {}: {}", file.display(), e),
        }
    }
    Ok(lists)
}

/// Records of a token list given either as a bare array or as `{ tokens: [...] }`.
///
/// Entries that do not parse (bad address, missing chain id) are dropped one by one.
pub fn parse_token_list(raw: Value) -> Vec<TokenEntry> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tokens") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<TokenEntry>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Dropping unparseable list entry: {}", e);
                None
            }
        })
        .collect()
}

/// One list record per chain deployment of an Across symbol.
///
/// Deployments that override the symbol's decimals are not emitted as records of their own,
/// but still appear in their siblings' `acrossInfo`.
pub fn across_entries(token: &AcrossToken, supported: &[ChainId]) -> Vec<TokenEntry> {
    let deployments: Vec<(ChainId, Address, Option<u8>)> = token
        .addresses
        .iter()
        .filter_map(|(chain, deployment)| {
            let chain_id = chain.trim().parse::<ChainId>().ok()?;
            match clean_address(&deployment.address) {
                Some(address) => Some((chain_id, address, deployment.decimals)),
                None => {
                    warn!(
                        "skipping, invalid Across address {} for {} on chain {}",
                        deployment.address, token.symbol, chain_id
                    );
                    None
                }
            }
        })
        .collect();

    deployments
        .iter()
        .filter(|(_, _, decimals)| decimals.is_none())
        .map(|&(chain_id, address, _)| {
            let siblings: BTreeMap<ChainId, AcrossInfo> = deployments
                .iter()
                .filter(|(other, _, _)| *other != chain_id && supported.contains(other))
                .map(|&(other, address, decimals)| (other, AcrossInfo { address, decimals }))
                .collect();

            let mut entry = TokenEntry::new(chain_id, address, &token.name, &token.symbol, token.decimals);
            entry.logo_uri = token.logo_uri.clone().filter(|l| !l.is_empty());
            entry.tags = Some(Vec::new());
            entry.is_across = true;
            entry.extensions.set_typed("acrossInfo", &siblings);
            if let Some(id) = &token.coingecko_id {
                entry.extensions.insert("coingeckoId", Value::String(id.clone()));
            }
            entry.extensions = std::mem::take(&mut entry.extensions).ordered();
            entry
        })
        .collect()
}

/// Converts an enriched OFT record into list form, with bridging data under `oftInfo`.
///
/// Records without a usable address or ERC-20 identity yield `None`.
pub fn oft_entry(token: &OftToken) -> Option<TokenEntry> {
    if token.address.is_zero() {
        return None;
    }
    let name = token.name.as_deref().filter(|n| !n.is_empty())?;
    let symbol = token.symbol.as_deref().filter(|s| !s.is_empty())?;
    let decimals = token.decimals.filter(|d| *d > 0)?;

    let mut entry = TokenEntry::new(token.chain_id, token.address, name, symbol, decimals);
    entry.logo_uri = token.icon.clone().filter(|l| !l.is_empty());
    entry.tags = Some(Vec::new());
    entry.extensions = token.extensions.clone();

    if let Some(bridge) = token.bridge.bridge() {
        entry.is_oft = true;
        let mut bridging = Extensions::new();
        bridging.set_oft_info(&bridge.to_oft_info());
        entry.extensions = entry.extensions.merge(&bridging);
    } else {
        entry.extensions = entry.extensions.ordered();
    }
    Some(entry)
}
