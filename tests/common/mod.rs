//! Scripted on-chain state for integration tests.
//!
//! [`ScriptedChains`] answers multicall batches from an in-memory description of OFT adapters
//! and ERC-20 tokens, dispatching on the call selector the same way a node would.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::abi::{encode, Function, Token};
use ethers::types::{Address, Bytes, U256};
use std::collections::HashMap;
use std::sync::Mutex;

use omnichain_token_list::contracts::erc20::{DECIMALS, NAME, SYMBOL};
use omnichain_token_list::contracts::oft::{
    address_to_bytes32, ENDPOINT, GET_TRUSTED_REMOTE_ADDRESS, LZ_ENDPOINT, MIN_DST_GAS_LOOKUP, PEERS, QUOTE_OFT,
    QUOTE_OFT_FEE, SEND_FROM_V1, SEND_FROM_V2, SEND_V3, SHARED_DECIMALS, TOKEN,
};
use omnichain_token_list::error::RpcError;
use omnichain_token_list::multicall::{BatchCaller, Call, CallResult};
use omnichain_token_list::settings::{ChainConfig, Settings};
use omnichain_token_list::types::{
    BridgeStatus, ChainId, Extensions, OftBridge, OftToken, OftVersion,
};

/// `Error(string)` selector, returned by probes that hit a real function body.
const REVERT: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, Clone)]
pub struct MockAdapter {
    pub version: OftVersion,
    /// Underlying ERC-20 for proxy adapters.
    pub wraps: Option<Address>,
    pub shared_decimals: Option<u8>,
    /// Remote adapter by destination endpoint id.
    pub peers: HashMap<u32, Address>,
    pub fee_bps: u64,
    pub min_dst_gas: u64,
}

impl MockAdapter {
    pub fn new(version: OftVersion) -> Self {
        Self {
            version,
            wraps: None,
            shared_decimals: (version == OftVersion::V3).then_some(6),
            peers: HashMap::new(),
            fee_bps: 0,
            min_dst_gas: 0,
        }
    }

    pub fn peer(mut self, eid: u32, remote: Address) -> Self {
        self.peers.insert(eid, remote);
        self
    }

    pub fn fee(mut self, bps: u64) -> Self {
        self.fee_bps = bps;
        self
    }
}

#[derive(Default)]
pub struct ScriptedChains {
    adapters: HashMap<(ChainId, Address), MockAdapter>,
    erc20s: HashMap<(ChainId, Address), (String, String, u8)>,
    /// `(chain id, batch length)` for every batch served.
    pub batches: Mutex<Vec<(ChainId, usize)>>,
}

impl ScriptedChains {
    pub fn new() -> Self {
        Self::default()
    }

    /// A native OFT: the adapter is its own ERC-20.
    pub fn oft(mut self, chain_id: ChainId, address: Address, symbol: &str, decimals: u8, adapter: MockAdapter) -> Self {
        self.erc20s
            .insert((chain_id, address), (format!("{} Token", symbol), symbol.to_string(), decimals));
        self.adapters.insert((chain_id, address), adapter);
        self
    }

    /// A proxy adapter in front of an existing ERC-20.
    pub fn proxy(
        mut self,
        chain_id: ChainId,
        adapter_address: Address,
        token: Address,
        symbol: &str,
        decimals: u8,
        mut adapter: MockAdapter,
    ) -> Self {
        adapter.wraps = Some(token);
        self.erc20s
            .insert((chain_id, token), (format!("{} Token", symbol), symbol.to_string(), decimals));
        self.adapters.insert((chain_id, adapter_address), adapter);
        self
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn answer(&self, chain_id: ChainId, call: &Call) -> CallResult {
        if call.call_data.len() < 4 {
            return CallResult::default();
        }
        let selector = &call.call_data[..4];
        let args = &call.call_data[4..];
        let key = (chain_id, call.target);

        if let Some((name, symbol, decimals)) = self.erc20s.get(&key) {
            if is(selector, &NAME) {
                return ok(&[Token::String(name.clone())]);
            }
            if is(selector, &SYMBOL) {
                return ok(&[Token::String(symbol.clone())]);
            }
            if is(selector, &DECIMALS) {
                return ok(&[Token::Uint(U256::from(*decimals))]);
            }
        }

        let Some(adapter) = self.adapters.get(&key) else {
            return CallResult::default();
        };
        let on_v2_endpoint = adapter.version == OftVersion::V3;
        let endpoint = Token::Address(Address::repeat_byte(0xee));

        if is(selector, &ENDPOINT) {
            return if on_v2_endpoint { ok(&[endpoint]) } else { failed() };
        }
        if is(selector, &LZ_ENDPOINT) {
            return if on_v2_endpoint { failed() } else { ok(&[endpoint]) };
        }
        if is(selector, &TOKEN) {
            return adapter.wraps.map_or_else(failed, |t| ok(&[Token::Address(t)]));
        }
        if is(selector, &SHARED_DECIMALS) {
            return adapter
                .shared_decimals
                .map_or_else(failed, |d| ok(&[Token::Uint(U256::from(d))]));
        }
        for (probe, version) in [
            (&*SEND_V3, OftVersion::V3),
            (&*SEND_FROM_V2, OftVersion::V2),
            (&*SEND_FROM_V1, OftVersion::V1),
        ] {
            if is(selector, probe) {
                return if adapter.version == version { reverted() } else { failed() };
            }
        }
        if is(selector, &PEERS) {
            let remote = eid_arg(&PEERS, args).and_then(|eid| adapter.peers.get(&eid).copied());
            return ok(&[remote.map_or_else(|| Token::FixedBytes(vec![0u8; 32]), address_to_bytes32)]);
        }
        if is(selector, &GET_TRUSTED_REMOTE_ADDRESS) {
            let remote = eid_arg(&GET_TRUSTED_REMOTE_ADDRESS, args).and_then(|eid| adapter.peers.get(&eid).copied());
            let path = remote.map_or_else(Vec::new, |r| {
                let mut path = r.as_bytes().to_vec();
                path.extend_from_slice(call.target.as_bytes());
                path
            });
            return ok(&[Token::Bytes(path)]);
        }
        if is(selector, &QUOTE_OFT) {
            let Some(amount) = quote_amount(args) else {
                return failed();
            };
            let received = amount - amount * U256::from(adapter.fee_bps) / U256::from(10_000u64);
            return ok(&[
                Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::MAX)]),
                Token::Array(vec![]),
                Token::Tuple(vec![Token::Uint(amount), Token::Uint(received)]),
            ]);
        }
        if is(selector, &QUOTE_OFT_FEE) {
            let Some(amount) = QUOTE_OFT_FEE
                .decode_input(args)
                .ok()
                .and_then(|t| t.into_iter().nth(1))
                .and_then(Token::into_uint)
            else {
                return failed();
            };
            return ok(&[Token::Uint(amount * U256::from(adapter.fee_bps) / U256::from(10_000u64))]);
        }
        if is(selector, &MIN_DST_GAS_LOOKUP) {
            return ok(&[Token::Uint(U256::from(adapter.min_dst_gas))]);
        }
        CallResult::default()
    }
}

#[async_trait]
impl BatchCaller for ScriptedChains {
    async fn call_batch(&self, chain: &ChainConfig, calls: &[Call]) -> Result<Vec<CallResult>, RpcError> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push((chain.chain_id, calls.len()));
        }
        Ok(calls.iter().map(|c| self.answer(chain.chain_id, c)).collect())
    }
}

fn is(selector: &[u8], f: &Function) -> bool {
    selector == &f.short_signature()[..]
}

fn ok(tokens: &[Token]) -> CallResult {
    CallResult {
        success: true,
        return_data: Bytes::from(encode(tokens)),
    }
}

fn failed() -> CallResult {
    CallResult::default()
}

fn reverted() -> CallResult {
    let mut data = REVERT.to_vec();
    data.extend_from_slice(&[0u8; 32]);
    CallResult {
        success: false,
        return_data: Bytes::from(data),
    }
}

fn eid_arg(f: &Function, args: &[u8]) -> Option<u32> {
    let eid = f.decode_input(args).ok()?.into_iter().next()?.into_uint()?;
    Some(eid.low_u32())
}

fn quote_amount(args: &[u8]) -> Option<U256> {
    let param = QUOTE_OFT.decode_input(args).ok()?.into_iter().next()?.into_tuple()?;
    param.into_iter().nth(2)?.into_uint()
}

/// Default settings restricted to the given chains.
pub fn settings_for(chain_ids: &[ChainId]) -> Settings {
    let mut settings = Settings::default();
    settings.chains.retain(|c| chain_ids.contains(&c.chain_id));
    settings
}

pub fn eid_v2(settings: &Settings, chain_id: ChainId) -> u32 {
    settings
        .chain_by_id(chain_id)
        .map(|c| c.eid_v2)
        .expect("chain configured")
}

/// A bare discovery seed for `adapter` on `chain_id`.
pub fn seed(settings: &Settings, chain_id: ChainId, adapter: Address) -> OftToken {
    let chain = settings.chain_by_id(chain_id).expect("chain configured");
    OftToken {
        chain_key: chain.key.clone(),
        chain_id,
        address: adapter,
        name: None,
        symbol: None,
        decimals: None,
        icon: None,
        extensions: Extensions::new(),
        bridge: BridgeStatus::BridgeToken(OftBridge::new(adapter)),
        rest: Default::default(),
    }
}
