use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::conversions::{address_to_string, checksum};
use super::extensions::{Extensions, FeeInfo, OftInfo, PeerInfo};
use super::ChainId;

/// Bridging-token implementation generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OftVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl OftVersion {
    /// v3 adapters sit on endpoint v2; every earlier generation on endpoint v1.
    pub fn endpoint_version(self) -> EndpointVersion {
        match self {
            OftVersion::V3 => EndpointVersion::V2,
            OftVersion::V1 | OftVersion::V2 => EndpointVersion::V1,
        }
    }
}

impl TryFrom<u8> for OftVersion {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(OftVersion::V1),
            2 => Ok(OftVersion::V2),
            3 => Ok(OftVersion::V3),
            other => Err(format!("unknown oft version {}", other)),
        }
    }
}

impl From<OftVersion> for u8 {
    fn from(v: OftVersion) -> u8 {
        v as u8
    }
}

/// Messaging-layer endpoint generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EndpointVersion {
    V1 = 1,
    V2 = 2,
}

impl EndpointVersion {
    /// Endpoint v2 ids live in the 30000+ range.
    pub fn from_eid(eid: u32) -> Self {
        if eid >= 30_000 {
            EndpointVersion::V2
        } else {
            EndpointVersion::V1
        }
    }
}

impl TryFrom<u8> for EndpointVersion {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(EndpointVersion::V1),
            2 => Ok(EndpointVersion::V2),
            other => Err(format!("unknown endpoint version {}", other)),
        }
    }
}

impl From<EndpointVersion> for u8 {
    fn from(v: EndpointVersion) -> u8 {
        v as u8
    }
}

/// `(chainId, address)` identity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenKey {
    pub chain_id: ChainId,
    pub address: Address,
}

impl TokenKey {
    pub fn new(chain_id: ChainId, address: Address) -> Self {
        Self { chain_id, address }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", address_to_string(self.address), self.chain_id)
    }
}

/// One record of a published token list.
///
/// Field order is the serialized attribute order; unknown attributes are kept in `rest`
/// and written after the known ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    pub chain_id: ChainId,
    #[serde(default, with = "checksum::option", skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, with = "checksum::option", skip_serializing_if = "Option::is_none")]
    pub global_address: Option<Address>,
    #[serde(default, with = "checksum::option", skip_serializing_if = "Option::is_none")]
    pub local_address: Option<Address>,
    #[serde(default, with = "checksum::option", skip_serializing_if = "Option::is_none")]
    pub underlying_address: Option<Address>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(rename = "logoURI", default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
    #[serde(default)]
    pub is_across: bool,
    #[serde(rename = "isOFT", default)]
    pub is_oft: bool,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl TokenEntry {
    pub fn new(chain_id: ChainId, address: Address, name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            chain_id,
            address: Some(address),
            global_address: None,
            local_address: None,
            underlying_address: None,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            logo_uri: None,
            tags: None,
            extensions: Extensions::new(),
            is_across: false,
            is_oft: false,
            rest: Map::new(),
        }
    }

    /// `address`, or `underlyingAddress` for registry records that only carry the latter.
    pub fn primary_address(&self) -> Option<Address> {
        self.address.or(self.underlying_address)
    }

    pub fn key(&self) -> Option<TokenKey> {
        self.primary_address()
            .map(|a| TokenKey::new(self.chain_id, a))
    }

    /// Every key this record can be addressed by.
    pub fn keys(&self) -> Vec<TokenKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(a) = self.address {
            keys.push(TokenKey::new(self.chain_id, a));
        }
        if let Some(u) = self.underlying_address {
            if Some(u) != self.address {
                keys.push(TokenKey::new(self.chain_id, u));
            }
        }
        keys
    }

    pub fn oft_info(&self) -> Option<OftInfo> {
        self.extensions.oft_info()
    }

    pub fn peers(&self) -> BTreeMap<ChainId, Address> {
        self.oft_info()
            .and_then(|i| i.peers_info)
            .map(|p| p.into_iter().map(|(c, i)| (c, i.token_address)).collect())
            .unwrap_or_default()
    }

    pub fn has_logo(&self) -> bool {
        self.logo_uri.as_deref().map_or(false, |l| !l.is_empty())
    }
}

/// Bridging data of a live adapter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OftBridge {
    pub adapter: Address,
    pub oft_version: Option<OftVersion>,
    pub endpoint_version: Option<EndpointVersion>,
    pub endpoint_id: Option<u32>,
    pub shared_decimals: Option<u8>,
    pub peers: BTreeMap<ChainId, Address>,
    pub fees: BTreeMap<ChainId, FeeInfo>,
    /// Metadata flags the adapter as charging a fee even without a version signal.
    pub fee_flag: bool,
}

impl OftBridge {
    pub fn new(adapter: Address) -> Self {
        Self {
            adapter,
            ..Default::default()
        }
    }

    /// Quotes go through `quoteOFT` rather than the legacy fee lookup.
    pub fn uses_v3_quote(&self) -> bool {
        self.oft_version == Some(OftVersion::V3)
            || self.endpoint_version == Some(EndpointVersion::V2)
    }

    pub fn to_oft_info(&self) -> OftInfo {
        OftInfo {
            peers_info: (!self.peers.is_empty()).then(|| {
                self.peers
                    .iter()
                    .map(|(c, a)| (*c, PeerInfo::from(*a)))
                    .collect()
            }),
            fee_info: (!self.fees.is_empty()).then(|| self.fees.clone()),
            oft_adapter: Some(self.adapter),
            oft_version: self.oft_version,
            endpoint_version: self.endpoint_version,
            endpoint_id: self.endpoint_id,
            oft_shared_decimals: self.shared_decimals,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeStatus {
    NotABridgeToken,
    BridgeToken(OftBridge),
}

impl BridgeStatus {
    pub fn bridge(&self) -> Option<&OftBridge> {
        match self {
            BridgeStatus::BridgeToken(b) => Some(b),
            BridgeStatus::NotABridgeToken => None,
        }
    }

    pub fn bridge_mut(&mut self) -> Option<&mut OftBridge> {
        match self {
            BridgeStatus::BridgeToken(b) => Some(b),
            BridgeStatus::NotABridgeToken => None,
        }
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self, BridgeStatus::BridgeToken(_))
    }
}

/// A token as it moves through discovery and fee enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OftTokenRecord", into = "OftTokenRecord")]
pub struct OftToken {
    pub chain_key: String,
    pub chain_id: ChainId,
    pub address: Address,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub icon: Option<String>,
    /// Ids, `bridgeInfo` and passthrough keys; bridging data lives in `bridge`.
    pub extensions: Extensions,
    pub bridge: BridgeStatus,
    pub rest: Map<String, Value>,
}

impl OftToken {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain_id, self.address)
    }

    pub fn adapter(&self) -> Option<Address> {
        self.bridge.bridge().map(|b| b.adapter)
    }

    pub fn peers(&self) -> Option<&BTreeMap<ChainId, Address>> {
        self.bridge.bridge().map(|b| &b.peers)
    }

    pub fn display_symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or("?")
    }
}

/// Flat snapshot shape of [`OftToken`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OftTokenRecord {
    chain_key: String,
    chain_id: ChainId,
    #[serde(with = "checksum")]
    address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decimals: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(rename = "isOFT", default, skip_serializing_if = "Option::is_none")]
    is_oft: Option<bool>,
    #[serde(default, with = "checksum::option", skip_serializing_if = "Option::is_none")]
    oft_adapter: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oft_version: Option<OftVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint_version: Option<EndpointVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oft_shared_decimals: Option<u8>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    fee: bool,
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    extensions: Extensions,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<OftTokenRecord> for OftToken {
    fn from(r: OftTokenRecord) -> Self {
        let mut extensions = r.extensions;
        let peers: BTreeMap<ChainId, PeerInfo> = extensions.typed("peersInfo").unwrap_or_default();
        let fees: BTreeMap<ChainId, FeeInfo> = extensions.typed("feeInfo").unwrap_or_default();
        extensions.remove("peersInfo");
        extensions.remove("feeInfo");

        let bridge = match (r.is_oft, r.oft_adapter) {
            (Some(false), _) | (_, None) => BridgeStatus::NotABridgeToken,
            (_, Some(adapter)) => BridgeStatus::BridgeToken(OftBridge {
                adapter,
                oft_version: r.oft_version,
                endpoint_version: r.endpoint_version,
                endpoint_id: r.endpoint_id,
                shared_decimals: r.oft_shared_decimals,
                peers: peers.into_iter().map(|(c, p)| (c, p.token_address)).collect(),
                fees,
                fee_flag: r.fee,
            }),
        };

        OftToken {
            chain_key: r.chain_key,
            chain_id: r.chain_id,
            address: r.address,
            name: r.name,
            symbol: r.symbol,
            decimals: r.decimals,
            icon: r.icon,
            extensions,
            bridge,
            rest: r.rest,
        }
    }
}

impl From<OftToken> for OftTokenRecord {
    fn from(t: OftToken) -> Self {
        let mut extensions = t.extensions;
        let mut record = OftTokenRecord {
            chain_key: t.chain_key,
            chain_id: t.chain_id,
            address: t.address,
            name: t.name,
            symbol: t.symbol,
            decimals: t.decimals,
            icon: t.icon,
            is_oft: None,
            oft_adapter: None,
            oft_version: None,
            endpoint_version: None,
            endpoint_id: None,
            oft_shared_decimals: None,
            fee: false,
            extensions: Extensions::new(),
            rest: t.rest,
        };

        match t.bridge {
            BridgeStatus::NotABridgeToken => record.is_oft = Some(false),
            BridgeStatus::BridgeToken(b) => {
                record.is_oft = Some(true);
                record.oft_adapter = Some(b.adapter);
                record.oft_version = b.oft_version;
                record.endpoint_version = b.endpoint_version;
                record.endpoint_id = b.endpoint_id;
                record.oft_shared_decimals = b.shared_decimals;
                record.fee = b.fee_flag;
                if !b.peers.is_empty() {
                    let peers: BTreeMap<ChainId, PeerInfo> =
                        b.peers.into_iter().map(|(c, a)| (c, a.into())).collect();
                    extensions.set_typed("peersInfo", &peers);
                }
                if !b.fees.is_empty() {
                    extensions.set_typed("feeInfo", &b.fees);
                }
            }
        }
        record.extensions = extensions.ordered();
        record
    }
}
