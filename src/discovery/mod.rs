//! # Peer Discovery
//!
//! Breadth-first expansion of the cross-chain peer graph. Every round drains a FIFO queue of
//! records, probes them chain by chain in three batched phases and enqueues any peer address
//! that has not been seen on its chain before. The loop stops when a round enqueues nothing.
//!
//! A record moves through [`ProbeState`]: `Queued -> Probed -> Enriched -> PeersDiscovered`, or
//! to `Removed` when the contract does not answer the ERC-20 identity calls.

pub mod evidence;
pub mod probe;

use ethers::types::Address;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::error::RpcError;
use crate::metrics;
use crate::multicall::{BatchCaller, Call, CallResult};
use crate::settings::{ChainConfig, Settings};
use crate::types::{BridgeStatus, ChainId, EndpointVersion, Extensions, OftBridge, OftToken};
use evidence::{Evidence, Resolution};
use probe::{capability, peers, protocol, ProbeCalldata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Queued,
    /// Endpoint signals and proxy unwrap applied.
    Probed,
    /// ERC-20 identity and versions known.
    Enriched,
    PeersDiscovered,
    Removed,
}

#[derive(Debug, Clone)]
struct Record {
    /// Identity fields; bridging data lives in `bridge` until the run finishes.
    token: OftToken,
    bridge: OftBridge,
    state: ProbeState,
    evidence: Evidence,
}

impl Record {
    fn new(mut token: OftToken) -> Self {
        let bridge = match std::mem::replace(&mut token.bridge, BridgeStatus::NotABridgeToken) {
            BridgeStatus::BridgeToken(b) => b,
            BridgeStatus::NotABridgeToken => OftBridge::new(token.address),
        };
        Self {
            token,
            bridge,
            state: ProbeState::Queued,
            evidence: Evidence::default(),
        }
    }

    fn adapter(&self) -> Address {
        self.bridge.adapter
    }

    fn endpoint_version(&self) -> Option<EndpointVersion> {
        self.bridge
            .endpoint_version
            .or_else(|| self.bridge.endpoint_id.map(EndpointVersion::from_eid))
    }

    fn into_token(self) -> OftToken {
        OftToken {
            bridge: BridgeStatus::BridgeToken(self.bridge),
            ..self.token
        }
    }
}

/// Result of a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub tokens: Vec<OftToken>,
    pub rounds: usize,
    pub removed: usize,
}

pub struct DiscoveryEngine<'a> {
    caller: &'a dyn BatchCaller,
    settings: &'a Settings,
    probes: ProbeCalldata,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(caller: &'a dyn BatchCaller, settings: &'a Settings) -> Result<Self, RpcError> {
        Ok(Self {
            caller,
            settings,
            probes: ProbeCalldata::new()?,
        })
    }

    /// Runs rounds until the peer graph stops growing.
    pub async fn run(&self, seeds: Vec<OftToken>) -> DiscoveryOutcome {
        let mut records: Vec<Record> = Vec::with_capacity(seeds.len());
        let mut seen: HashSet<(ChainId, Address)> = HashSet::new();
        let mut queue: VecDeque<usize> = VecDeque::new();

        for seed in seeds {
            let record = Record::new(seed);
            seen.insert((record.token.chain_id, record.adapter()));
            queue.push_back(records.len());
            records.push(record);
        }

        let mut rounds = 0;
        while !queue.is_empty() {
            if rounds >= self.settings.discovery.max_rounds {
                warn!(
                    "Discovery stopped after {} rounds with {} records still queued",
                    rounds,
                    queue.len()
                );
                for idx in queue.drain(..) {
                    records[idx].state = ProbeState::Removed;
                }
                break;
            }
            rounds += 1;
            metrics::gauge_discovery_round(rounds);
            info!("=== Discovery round {}: {} record(s) to process ===", rounds, queue.len());

            let round: Vec<usize> = queue.drain(..).collect();
            let mut next = VecDeque::new();

            for chain in &self.settings.chains {
                let members: Vec<usize> = round
                    .iter()
                    .copied()
                    .filter(|&i| records[i].token.chain_id == chain.chain_id)
                    .collect();
                if members.is_empty() {
                    continue;
                }
                debug!("Processing {} with {} record(s)", chain.key, members.len());

                if let Err(e) = self
                    .process_chain(chain, &members, &mut records, &mut seen, &mut next)
                    .await
                {
                    error!("Discovery on {} skipped for this round: {}", chain.key, e);
                }
            }

            let unknown = round
                .iter()
                .filter(|&&i| self.settings.chain_by_id(records[i].token.chain_id).is_none())
                .count();
            if unknown > 0 {
                warn!("{} record(s) on unconfigured chains were not probed", unknown);
            }

            queue = next;
        }

        self.finish(records, rounds)
    }

    async fn process_chain(
        &self,
        chain: &ChainConfig,
        members: &[usize],
        records: &mut Vec<Record>,
        seen: &mut HashSet<(ChainId, Address)>,
        next: &mut VecDeque<usize>,
    ) -> Result<(), RpcError> {
        self.protocol_phase(chain, members, records).await?;
        self.capability_phase(chain, members, records).await?;
        self.peer_phase(chain, members, records, seen, next).await
    }

    async fn call_phase(
        &self,
        chain: &ChainConfig,
        phase: &'static str,
        calls: &[Call],
    ) -> Result<Vec<CallResult>, RpcError> {
        match self.caller.call_batch(chain, calls).await {
            Ok(results) if results.len() == calls.len() => Ok(results),
            Ok(results) => {
                metrics::increment_phase_failures(&chain.key, phase);
                Err(RpcError::MalformedResponse {
                    url: chain.key.clone(),
                    reason: format!("{} expected {} results, got {}", phase, calls.len(), results.len()),
                })
            }
            Err(e) => {
                metrics::increment_phase_failures(&chain.key, phase);
                Err(e)
            }
        }
    }

    async fn protocol_phase(
        &self,
        chain: &ChainConfig,
        members: &[usize],
        records: &mut [Record],
    ) -> Result<(), RpcError> {
        let calls: Vec<Call> = members
            .iter()
            .flat_map(|&i| protocol::calls(&self.probes, records[i].adapter()))
            .collect();
        let results = self.call_phase(chain, "protocol", &calls).await?;

        for (&i, window) in members.iter().zip(results.chunks(protocol::CALLS_PER_RECORD)) {
            let outcome = protocol::decode(window);
            let record = &mut records[i];
            record.evidence.endpoint |= outcome.endpoint;
            record.evidence.lz_endpoint |= outcome.lz_endpoint;
            if let Some(wrapped) = outcome.wrapped_token {
                debug!("{:?} on {} wraps {:?}", record.adapter(), chain.key, wrapped);
                record.token.address = wrapped;
            }
            record.state = ProbeState::Probed;
        }
        Ok(())
    }

    async fn capability_phase(
        &self,
        chain: &ChainConfig,
        members: &[usize],
        records: &mut [Record],
    ) -> Result<(), RpcError> {
        let calls: Vec<Call> = members
            .iter()
            .flat_map(|&i| capability::calls(&self.probes, records[i].adapter(), records[i].token.address))
            .collect();
        let results = self.call_phase(chain, "capability", &calls).await?;

        for (&i, window) in members.iter().zip(results.chunks(capability::CALLS_PER_RECORD)) {
            let outcome = capability::decode(window);
            let record = &mut records[i];

            if !outcome.is_token() {
                debug!(
                    "{:?} on {} does not answer ERC-20 identity calls, removing",
                    record.token.address, chain.key
                );
                record.state = ProbeState::Removed;
                continue;
            }
            record.token.name = outcome.name.clone();
            record.token.symbol = outcome.symbol.clone();
            record.token.decimals = outcome.decimals;
            outcome.record_into(&mut record.evidence);

            let prior = Resolution {
                oft_version: record.bridge.oft_version,
                endpoint_version: record.bridge.endpoint_version,
            };
            let resolved = record.evidence.resolve(prior);
            let shared_decimals = record.evidence.shared_decimals;

            let bridge = &mut record.bridge;
            bridge.oft_version = resolved.oft_version;
            bridge.endpoint_version = resolved.endpoint_version;
            if let Some(d) = shared_decimals {
                bridge.shared_decimals = Some(d);
            }
            if let Some(version) = resolved.endpoint_version {
                let consistent = bridge
                    .endpoint_id
                    .map_or(false, |eid| EndpointVersion::from_eid(eid) == version);
                if !consistent {
                    bridge.endpoint_id = chain.eid(version);
                }
            }
            record.state = ProbeState::Enriched;
        }
        Ok(())
    }

    async fn peer_phase(
        &self,
        chain: &ChainConfig,
        members: &[usize],
        records: &mut Vec<Record>,
        seen: &mut HashSet<(ChainId, Address)>,
        next: &mut VecDeque<usize>,
    ) -> Result<(), RpcError> {
        // (record, destination chain, call shape) per call, in call order
        let mut plan: Vec<(usize, &ChainConfig, EndpointVersion)> = Vec::new();
        let mut calls: Vec<Call> = Vec::new();

        for &i in members {
            let record = &records[i];
            if record.state == ProbeState::Removed {
                continue;
            }
            let version = record.endpoint_version().unwrap_or(EndpointVersion::V1);
            for other in self.settings.chains.iter().filter(|c| c.chain_id != chain.chain_id) {
                let Some(dst_eid) = other.eid(version) else {
                    continue;
                };
                calls.push(peers::call(record.adapter(), version, dst_eid)?);
                plan.push((i, other, version));
            }
        }

        if calls.is_empty() {
            debug!("No peer calls needed for {}", chain.key);
            return Ok(());
        }
        let results = self.call_phase(chain, "peers", &calls).await?;

        let mut discovered = 0u64;
        for ((i, other, version), result) in plan.into_iter().zip(results.iter()) {
            let Some(peer) = peers::decode(version, result) else {
                continue;
            };
            records[i].bridge.peers.insert(other.chain_id, peer);

            if seen.insert((other.chain_id, peer)) {
                let token = OftToken {
                    chain_key: other.key.clone(),
                    chain_id: other.chain_id,
                    address: peer,
                    name: None,
                    symbol: None,
                    decimals: None,
                    icon: None,
                    extensions: Extensions::new(),
                    bridge: BridgeStatus::BridgeToken(OftBridge::new(peer)),
                    rest: Default::default(),
                };
                next.push_back(records.len());
                records.push(Record::new(token));
                discovered += 1;
            }
        }
        if discovered > 0 {
            info!("Discovered {} new peer(s) from {}", discovered, chain.key);
            metrics::increment_discovered_tokens(&chain.key, discovered);
        }

        for &i in members {
            if records[i].state == ProbeState::Enriched {
                records[i].state = ProbeState::PeersDiscovered;
            }
        }
        Ok(())
    }

    /// Drops removed records and points every peer at the final token address of its adapter.
    fn finish(&self, records: Vec<Record>, rounds: usize) -> DiscoveryOutcome {
        let adapter_to_token: HashMap<(ChainId, Address), Address> = records
            .iter()
            .map(|r| ((r.token.chain_id, r.adapter()), r.token.address))
            .collect();
        let known_tokens: HashSet<(ChainId, Address)> = records
            .iter()
            .filter(|r| r.state != ProbeState::Removed)
            .map(|r| (r.token.chain_id, r.token.address))
            .collect();

        let total = records.len();
        let mut tokens = Vec::with_capacity(total);
        for record in records {
            if record.state == ProbeState::Removed {
                continue;
            }
            let mut token = record.into_token();
            if let Some(bridge) = token.bridge.bridge_mut() {
                let resolved: BTreeMap<ChainId, Address> = bridge
                    .peers
                    .iter()
                    .map(|(&chain_id, &peer)| {
                        match adapter_to_token.get(&(chain_id, peer)) {
                            Some(&address) => (chain_id, address),
                            None => {
                                if !known_tokens.contains(&(chain_id, peer)) {
                                    warn!(
                                        "Token {:?}: no matching token found for peer {:?} on chain {}",
                                        token.address, peer, chain_id
                                    );
                                }
                                (chain_id, peer)
                            }
                        }
                    })
                    .collect();
                bridge.peers = resolved;
            }
            tokens.push(token);
        }

        let removed = total - tokens.len();
        metrics::increment_removed_tokens(removed as u64);
        info!(
            "Discovery finished after {} round(s): {} token(s), {} removed",
            rounds,
            tokens.len(),
            removed
        );

        DiscoveryOutcome {
            tokens,
            rounds,
            removed,
        }
    }
}
