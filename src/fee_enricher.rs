//! # Fee & Capability Enrichment
//!
//! For every confirmed peer pair this stage quotes the bridging fee and the legacy minimum
//! destination gas, and checks that each adapter is still wired to an endpoint. All three kinds of
//! call are packed into one multicall per chain and split back out by position.

use ethers::types::{Address, U256};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};

use crate::contracts::oft::{self, ENDPOINT, LZ_ENDPOINT, MIN_DST_GAS_LOOKUP, QUOTE_OFT_FEE};
use crate::error::RpcError;
use crate::multicall::{BatchCaller, Call, CallResult};
use crate::normalization::{fee_bps, one_unit};
use crate::settings::{ChainConfig, Settings};
use crate::types::conversions::u256_to_u64;
use crate::types::{BridgeStatus, ChainId, EndpointVersion, OftBridge, OftToken, OftVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteKind {
    /// `quoteOFT` receipt (v3 adapters / endpoint v2).
    Receipt,
    /// `quoteOFTFee` raw fee amount.
    Legacy,
}

#[derive(Debug, Clone)]
struct FeeCall {
    src: usize,
    dst_chain: ChainId,
    kind: QuoteKind,
    amount: U256,
}

#[derive(Debug, Clone)]
struct GasCall {
    src: usize,
    dst_chain: ChainId,
}

/// Calls for one chain, in the order they are sent: fees, then gas, then liveness.
#[derive(Debug, Default)]
struct ChainPlan {
    fee: Vec<FeeCall>,
    gas: Vec<GasCall>,
    liveness: Vec<usize>,
    calls: Vec<Call>,
}

impl ChainPlan {
    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

pub struct FeeEnricher<'a> {
    caller: &'a dyn BatchCaller,
    settings: &'a Settings,
}

impl<'a> FeeEnricher<'a> {
    pub fn new(caller: &'a dyn BatchCaller, settings: &'a Settings) -> Self {
        Self { caller, settings }
    }

    pub async fn enrich(&self, mut tokens: Vec<OftToken>) -> Vec<OftToken> {
        let mut plans: Vec<(&ChainConfig, ChainPlan)> = Vec::new();
        for chain in &self.settings.chains {
            match self.plan_chain(chain, &tokens) {
                Ok(plan) if !plan.is_empty() => plans.push((chain, plan)),
                Ok(_) => {}
                Err(e) => error!("Failed to encode fee calls for {}: {}", chain.key, e),
            }
        }

        for (chain, plan) in &plans {
            info!(
                "==> Aggregating {} fee, {} gas and {} liveness calls on {}",
                plan.fee.len(),
                plan.gas.len(),
                plan.liveness.len(),
                chain.key
            );
        }
        let batches = join_all(
            plans
                .iter()
                .map(|(chain, plan)| self.caller.call_batch(chain, &plan.calls)),
        )
        .await;

        for ((chain, plan), batch) in plans.iter().zip(batches) {
            let results = match batch {
                Ok(r) if r.len() == plan.calls.len() => r,
                Ok(r) => {
                    error!(
                        "Fee multicall on {} returned {} results for {} calls",
                        chain.key,
                        r.len(),
                        plan.calls.len()
                    );
                    continue;
                }
                Err(e) => {
                    error!("Fee multicall failed on {}: {}", chain.key, e);
                    continue;
                }
            };
            self.apply(plan, &results, &mut tokens);
        }

        self.finalise(&mut tokens);
        tokens
    }

    fn plan_chain(&self, chain: &ChainConfig, tokens: &[OftToken]) -> Result<ChainPlan, RpcError> {
        let mut plan = ChainPlan::default();
        let index = PeerIndex::new(tokens);
        let mut fee_calls = Vec::new();
        let mut gas_calls = Vec::new();

        for (src_idx, src) in tokens.iter().enumerate() {
            if src.chain_id != chain.chain_id {
                continue;
            }
            let Some(bridge) = src.bridge.bridge() else {
                continue;
            };
            let quotes_fee = bridge.fee_flag
                || bridge.oft_version == Some(OftVersion::V3)
                || bridge.oft_version == Some(OftVersion::V2)
                || bridge.endpoint_version == Some(EndpointVersion::V2);

            for (&dst_chain, &peer) in &bridge.peers {
                let Some(dst_idx) = index.confirmed_peer(src, dst_chain, peer) else {
                    warn!(
                        "Didn't find peer for {}:{:?} ({}) on chain {}, expected {:?}",
                        src.display_symbol(),
                        src.address,
                        src.chain_id,
                        dst_chain,
                        peer
                    );
                    continue;
                };
                let dst = &tokens[dst_idx];
                let Some(dst_eid) = dst.bridge.bridge().and_then(|b| b.endpoint_id) else {
                    warn!(
                        "Missing endpointId for {}_{:?} peer on chain {}",
                        src.chain_id, src.address, dst_chain
                    );
                    continue;
                };

                if let (true, Some(decimals)) = (quotes_fee, src.decimals) {
                    match one_unit(decimals) {
                        Some(amount) => {
                            let (kind, data) = if bridge.uses_v3_quote() {
                                (QuoteKind::Receipt, oft::encode_quote_oft(dst_eid, dst.address, amount)?)
                            } else {
                                (QuoteKind::Legacy, oft::encode_quote_oft_fee(dst_eid, amount)?)
                            };
                            plan.fee.push(FeeCall {
                                src: src_idx,
                                dst_chain,
                                kind,
                                amount,
                            });
                            fee_calls.push(Call::new(bridge.adapter, data));
                        }
                        None => warn!(
                            "Skipping fee quote for {}_{:?}: {} decimals overflow one whole unit",
                            src.chain_id, src.address, decimals
                        ),
                    }
                }

                if !bridge.uses_v3_quote() {
                    plan.gas.push(GasCall { src: src_idx, dst_chain });
                    gas_calls.push(Call::new(bridge.adapter, oft::encode_min_dst_gas_lookup(dst_eid)?));
                }
            }
        }

        let mut liveness_calls = Vec::new();
        for (src_idx, src) in tokens.iter().enumerate() {
            if src.chain_id != chain.chain_id {
                continue;
            }
            let Some(bridge) = src.bridge.bridge() else {
                continue;
            };
            let accessor = if bridge.uses_v3_quote() { &ENDPOINT } else { &LZ_ENDPOINT };
            plan.liveness.push(src_idx);
            liveness_calls.push(Call::new(bridge.adapter, oft::encode_no_args(accessor)?));
        }
        plan.calls = [fee_calls, gas_calls, liveness_calls].concat();

        Ok(plan)
    }

    fn apply(&self, plan: &ChainPlan, results: &[CallResult], tokens: &mut [OftToken]) {
        let (fee_results, rest) = results.split_at(plan.fee.len());
        let (gas_results, liveness_results) = rest.split_at(plan.gas.len());

        for (call, result) in plan.fee.iter().zip(fee_results) {
            let token = &mut tokens[call.src];
            let symbol = token.display_symbol().to_string();
            let Some(raw) = result.data() else {
                warn!(
                    "Empty fee quote for {} from chain {} to {}, skipping",
                    symbol, token.chain_id, call.dst_chain
                );
                continue;
            };
            let bps = match call.kind {
                QuoteKind::Receipt => oft::decode_quote_oft(raw).map(|(sent, received)| fee_bps(sent, received)),
                QuoteKind::Legacy => oft::decode_uint(&QUOTE_OFT_FEE, raw)
                    .map(|fee| fee_bps(call.amount, call.amount.saturating_sub(fee))),
            };
            let Some(bps) = bps else {
                warn!(
                    "Failed to decode fee quote for {} from chain {} to {}",
                    symbol, token.chain_id, call.dst_chain
                );
                continue;
            };
            if let Some(bridge) = token.bridge.bridge_mut() {
                bridge.fees.entry(call.dst_chain).or_default().oft_fee = Some(bps);
            }
        }

        for (call, result) in plan.gas.iter().zip(gas_results) {
            let default_gas = self.settings.fees.default_gas_for(call.dst_chain);
            let gas = result
                .data()
                .and_then(|raw| oft::decode_uint(&MIN_DST_GAS_LOOKUP, raw))
                .and_then(u256_to_u64)
                .filter(|g| *g > 0);
            if gas.is_none() {
                debug!(
                    "No minDstGas for {:?} to chain {}, using default {}",
                    tokens[call.src].address, call.dst_chain, default_gas
                );
            }
            if let Some(bridge) = tokens[call.src].bridge.bridge_mut() {
                bridge.fees.entry(call.dst_chain).or_default().min_dst_gas = Some(gas.unwrap_or(default_gas));
            }
        }

        for (&src, result) in plan.liveness.iter().zip(liveness_results) {
            let token = &mut tokens[src];
            let has_peers = token.peers().map_or(false, |p| !p.is_empty());
            let live = result
                .data()
                .and_then(|raw| oft::decode_address(&LZ_ENDPOINT, raw))
                .is_some();
            if !live || !has_peers {
                warn!(
                    "Not an OApp: {} on chain {} ({:?}), removing bridging fields",
                    token.display_symbol(),
                    token.chain_id,
                    token.adapter()
                );
                token.bridge = BridgeStatus::NotABridgeToken;
            }
        }
    }

    /// Clean-up applied to every token once all chains have been queried.
    fn finalise(&self, tokens: &mut [OftToken]) {
        for token in tokens.iter_mut() {
            let self_chain = token.chain_id;
            let mut bridge_info = token.extensions.bridge_info();
            if bridge_info.remove(&self_chain).is_some() {
                token.extensions.set_typed("bridgeInfo", &bridge_info);
            }

            let chain = self.settings.chain_by_id(self_chain);
            let address = token.address;
            if let Some(bridge) = token.bridge.bridge_mut() {
                bridge.fees.remove(&self_chain);
                populate_versions(bridge, chain);
                if let Some(adapter) = self.settings.fees.adapter_override(self_chain, &address) {
                    bridge.adapter = adapter;
                }
            }
            if token.peers().map_or(false, |p| p.is_empty()) {
                token.bridge = BridgeStatus::NotABridgeToken;
            }
            token.extensions.prune_empty();
        }
        copy_ids_from_namesakes(tokens);
    }
}

/// Fills versions left open by discovery so the pair is always consistent.
fn populate_versions(bridge: &mut OftBridge, chain: Option<&ChainConfig>) {
    match (bridge.oft_version, bridge.endpoint_version) {
        (None, Some(EndpointVersion::V2)) => bridge.oft_version = Some(OftVersion::V3),
        (None, Some(EndpointVersion::V1)) => {}
        (Some(v), _) => bridge.endpoint_version = Some(v.endpoint_version()),
        (None, None) => {
            bridge.oft_version = Some(OftVersion::V1);
            bridge.endpoint_version = Some(EndpointVersion::V1);
        }
    }
    if let (Some(version), Some(chain)) = (bridge.endpoint_version, chain) {
        let consistent = bridge
            .endpoint_id
            .map_or(false, |eid| EndpointVersion::from_eid(eid) == version);
        if !consistent {
            bridge.endpoint_id = chain.eid(version);
        }
    }
}

fn copy_ids_from_namesakes(tokens: &mut [OftToken]) {
    let mut by_name: HashMap<String, (Option<String>, Option<serde_json::Value>, Option<String>)> =
        HashMap::new();
    for token in tokens.iter() {
        let Some(name) = token.name.clone() else {
            continue;
        };
        let slot = by_name.entry(name).or_default();
        if slot.0.is_none() {
            slot.0 = token.extensions.coingecko_id().map(str::to_string);
        }
        if slot.1.is_none() {
            slot.1 = token.extensions.coin_market_cap_id().cloned();
        }
        if slot.2.is_none() {
            slot.2 = token.icon.clone();
        }
    }

    for token in tokens.iter_mut() {
        let Some((cg, cmc, icon)) = token.name.as_ref().and_then(|n| by_name.get(n)) else {
            continue;
        };
        if token.icon.is_none() {
            token.icon = icon.clone();
        }
        if token.extensions.coingecko_id().is_none() {
            if let Some(cg) = cg {
                token.extensions.insert("coingeckoId", serde_json::Value::String(cg.clone()));
            }
        }
        if token.extensions.coin_market_cap_id().is_none() {
            if let Some(cmc) = cmc {
                token.extensions.insert("coinMarketCapId", cmc.clone());
            }
        }
        token.extensions = std::mem::take(&mut token.extensions).ordered();
    }
}

/// Lookup of symmetric peers: `dst` is accepted only if it points back at `src`.
struct PeerIndex<'t> {
    by_chain: BTreeMap<ChainId, Vec<(usize, &'t OftToken)>>,
}

impl<'t> PeerIndex<'t> {
    fn new(tokens: &'t [OftToken]) -> Self {
        let mut by_chain: BTreeMap<ChainId, Vec<(usize, &'t OftToken)>> = BTreeMap::new();
        for (i, t) in tokens.iter().enumerate() {
            by_chain.entry(t.chain_id).or_default().push((i, t));
        }
        Self { by_chain }
    }

    fn confirmed_peer(&self, src: &OftToken, dst_chain: ChainId, peer: Address) -> Option<usize> {
        self.by_chain.get(&dst_chain)?.iter().find_map(|(i, dst)| {
            let matches_peer = dst.address == peer || dst.adapter() == Some(peer);
            let points_back = dst
                .peers()
                .and_then(|p| p.get(&src.chain_id))
                .map_or(false, |back| *back == src.address);
            (matches_peer && points_back).then_some(*i)
        })
    }
}
