use ethers::types::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::conversions::checksum;
use super::token::{EndpointVersion, OftVersion};
use super::ChainId;

/// Keys that always lead the extensions object, in this order.
pub const EXTENSION_PRIORITY: [&str; 5] = [
    "coingeckoId",
    "coinMarketCapId",
    "bridgeInfo",
    "acrossInfo",
    "oftInfo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(rename = "tokenAddress", with = "checksum")]
    pub token_address: Address,
}

impl From<Address> for PeerInfo {
    fn from(token_address: Address) -> Self {
        Self { token_address }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInfo {
    /// Bridging fee in basis points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oft_fee: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_dst_gas: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcrossInfo {
    #[serde(with = "checksum")]
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

/// Bridging metadata as it appears under `extensions.oftInfo` in the published lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OftInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers_info: Option<BTreeMap<ChainId, PeerInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_info: Option<BTreeMap<ChainId, FeeInfo>>,
    #[serde(
        default,
        with = "checksum::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub oft_adapter: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oft_version: Option<OftVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_version: Option<EndpointVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oft_shared_decimals: Option<u8>,
}

/// Ordered, open-ended `extensions` object.
///
/// Known keys have typed accessors; anything else passes through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(Map<String, Value>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_typed<T: Serialize>(&mut self, key: &str, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.0.insert(key.to_string(), v);
        }
    }

    /// Deep merge: `incoming` wins on scalars, nested objects are merged key by key and
    /// `null` never erases an existing value. Result keys follow [`EXTENSION_PRIORITY`].
    pub fn merge(&self, incoming: &Extensions) -> Extensions {
        let mut merged = Value::Object(self.0.clone());
        deep_merge(&mut merged, &Value::Object(incoming.0.clone()));
        match merged {
            Value::Object(map) => Extensions(map).ordered(),
            _ => self.clone(),
        }
    }

    pub fn ordered(self) -> Extensions {
        let mut rest = self.0;
        let mut ordered = Map::new();
        for key in EXTENSION_PRIORITY {
            if let Some(v) = rest.remove(key) {
                ordered.insert(key.to_string(), v);
            }
        }
        for (k, v) in rest {
            ordered.insert(k, v);
        }
        Extensions(ordered)
    }

    /// Drops keys whose value is `null` or an empty object.
    pub fn prune_empty(&mut self) {
        self.0.retain(|_, v| !is_blank(v));
    }

    pub fn coingecko_id(&self) -> Option<&str> {
        self.0.get("coingeckoId").and_then(Value::as_str)
    }

    pub fn coin_market_cap_id(&self) -> Option<&Value> {
        self.0.get("coinMarketCapId").filter(|v| !v.is_null())
    }

    pub fn oft_info(&self) -> Option<OftInfo> {
        self.typed("oftInfo")
    }

    pub fn set_oft_info(&mut self, info: &OftInfo) {
        self.set_typed("oftInfo", info);
    }

    pub fn bridge_info(&self) -> BTreeMap<ChainId, PeerInfo> {
        self.typed("bridgeInfo").unwrap_or_default()
    }

    pub fn across_info(&self) -> BTreeMap<ChainId, AcrossInfo> {
        self.typed("acrossInfo").unwrap_or_default()
    }
}

impl From<Map<String, Value>> for Extensions {
    fn from(map: Map<String, Value>) -> Self {
        Extensions(map)
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

pub fn deep_merge(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                if v.is_null() {
                    continue;
                }
                let nested = v.is_object() && dst.get(k).map_or(false, Value::is_object);
                if nested {
                    if let Some(slot) = dst.get_mut(k) {
                        deep_merge(slot, v);
                    }
                } else {
                    dst.insert(k.clone(), v.clone());
                }
            }
        }
        (slot, v) => {
            if !v.is_null() {
                *slot = v.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ext(v: Value) -> Extensions {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn merge_keeps_union_and_prefers_incoming() {
        let a = ext(json!({ "custom": 1, "coingeckoId": "old", "bridgeInfo": { "1": { "tokenAddress": "0x1111111111111111111111111111111111111111" } } }));
        let b = ext(json!({ "coingeckoId": "new", "bridgeInfo": { "10": { "tokenAddress": "0x2222222222222222222222222222222222222222" } } }));

        let merged = a.merge(&b);
        assert_eq!(merged.coingecko_id(), Some("new"));
        assert_eq!(merged.bridge_info().len(), 2);
        assert_eq!(merged.get("custom"), Some(&json!(1)));
    }

    #[test]
    fn merge_orders_priority_keys_first() {
        let a = ext(json!({ "zeta": true, "oftInfo": {}, "coingeckoId": "x" }));
        let merged = a.merge(&Extensions::new());
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, vec!["coingeckoId", "oftInfo", "zeta"]);
    }

    #[test]
    fn nested_oft_info_merges_deeply() {
        let a = ext(json!({ "oftInfo": { "peersInfo": { "1": { "tokenAddress": "0x1111111111111111111111111111111111111111" } }, "oftVersion": 3 } }));
        let b = ext(json!({ "oftInfo": { "peersInfo": { "10": { "tokenAddress": "0x2222222222222222222222222222222222222222" } } } }));
        let info = a.merge(&b).oft_info().unwrap();
        assert_eq!(info.peers_info.unwrap().len(), 2);
        assert_eq!(info.oft_version, Some(OftVersion::V3));
    }

    #[test]
    fn null_does_not_erase() {
        let a = ext(json!({ "coingeckoId": "keep" }));
        let b = ext(json!({ "coingeckoId": null }));
        assert_eq!(a.merge(&b).coingecko_id(), Some("keep"));
    }

    #[test]
    fn peers_info_serializes_with_numeric_key_order() {
        let mut peers = BTreeMap::new();
        peers.insert(8453u64, PeerInfo::from(Address::repeat_byte(1)));
        peers.insert(10u64, PeerInfo::from(Address::repeat_byte(2)));
        let info = OftInfo {
            peers_info: Some(peers),
            ..Default::default()
        };
        let s = serde_json::to_string(&info).unwrap();
        assert!(s.find("\"10\"").unwrap() < s.find("\"8453\"").unwrap());
    }
}
