//! Calldata for the three probe phases and the per-record decoding of their results.
//!
//! Every phase appends a fixed number of calls per record, so results are read back by slicing
//! the flat result vector into `CALLS_PER_RECORD`-sized windows in input order.

use ethers::types::{Address, Bytes};

use super::evidence::Evidence;
use crate::contracts::erc20::{self, DECIMALS, NAME, SYMBOL};
use crate::contracts::oft::{self, ENDPOINT, LZ_ENDPOINT, SHARED_DECIMALS, TOKEN};
use crate::multicall::{Call, CallResult};
use crate::types::{EndpointVersion, OftVersion};

/// Static calldata shared by every adapter.
#[derive(Debug, Clone)]
pub struct ProbeCalldata {
    endpoint: Bytes,
    lz_endpoint: Bytes,
    token: Bytes,
    shared_decimals: Bytes,
    name: Bytes,
    symbol: Bytes,
    decimals: Bytes,
    send_v3: Bytes,
    send_from_v2: Bytes,
    send_from_v1: Bytes,
}

impl ProbeCalldata {
    pub fn new() -> Result<Self, ethers::abi::Error> {
        Ok(Self {
            endpoint: oft::encode_no_args(&ENDPOINT)?,
            lz_endpoint: oft::encode_no_args(&LZ_ENDPOINT)?,
            token: oft::encode_no_args(&TOKEN)?,
            shared_decimals: oft::encode_no_args(&SHARED_DECIMALS)?,
            name: oft::encode_no_args(&NAME)?,
            symbol: oft::encode_no_args(&SYMBOL)?,
            decimals: oft::encode_no_args(&DECIMALS)?,
            send_v3: oft::encode_send_v3_probe()?,
            send_from_v2: oft::encode_send_from_v2_probe()?,
            send_from_v1: oft::encode_send_from_v1_probe()?,
        })
    }
}

/// Phase 1: which endpoint the adapter is wired to and whether it wraps another token.
pub mod protocol {
    use super::*;

    pub const CALLS_PER_RECORD: usize = 3;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Outcome {
        pub endpoint: bool,
        pub lz_endpoint: bool,
        pub wrapped_token: Option<Address>,
    }

    pub fn calls(probes: &ProbeCalldata, adapter: Address) -> [Call; CALLS_PER_RECORD] {
        [
            Call::new(adapter, probes.endpoint.clone()),
            Call::new(adapter, probes.lz_endpoint.clone()),
            Call::new(adapter, probes.token.clone()),
        ]
    }

    pub fn decode(results: &[CallResult]) -> Outcome {
        let wrapped_token = results
            .get(2)
            .and_then(CallResult::data)
            .and_then(|raw| oft::decode_address(&TOKEN, raw))
            .filter(|a| !a.is_zero());
        Outcome {
            endpoint: results.first().and_then(CallResult::data).is_some(),
            lz_endpoint: results.get(1).and_then(CallResult::data).is_some(),
            wrapped_token,
        }
    }
}

/// Phase 2: ERC-20 identity, shared decimals and send-function presence.
pub mod capability {
    use super::*;

    pub const CALLS_PER_RECORD: usize = 7;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Outcome {
        pub name: Option<String>,
        pub symbol: Option<String>,
        pub decimals: Option<u8>,
        pub shared_decimals: Option<u8>,
        pub send_probes: Vec<OftVersion>,
    }

    impl Outcome {
        /// A record missing any identity field is not a usable token.
        pub fn is_token(&self) -> bool {
            self.name.is_some() && self.symbol.is_some() && self.decimals.is_some()
        }

        pub fn record_into(&self, evidence: &mut Evidence) {
            evidence.shared_decimals = self.shared_decimals;
            evidence.send_probes.extend(self.send_probes.iter().copied());
        }
    }

    pub fn calls(probes: &ProbeCalldata, adapter: Address, token: Address) -> [Call; CALLS_PER_RECORD] {
        [
            Call::new(adapter, probes.shared_decimals.clone()),
            Call::new(token, probes.name.clone()),
            Call::new(token, probes.symbol.clone()),
            Call::new(token, probes.decimals.clone()),
            Call::new(adapter, probes.send_v3.clone()),
            Call::new(adapter, probes.send_from_v2.clone()),
            Call::new(adapter, probes.send_from_v1.clone()),
        ]
    }

    pub fn decode(results: &[CallResult]) -> Outcome {
        let data = |i: usize| results.get(i).and_then(CallResult::data);
        let answered = |i: usize| results.get(i).and_then(CallResult::raw).is_some();

        let mut send_probes = Vec::new();
        for (i, version) in [(4, OftVersion::V3), (5, OftVersion::V2), (6, OftVersion::V1)] {
            if answered(i) {
                send_probes.push(version);
            }
        }

        Outcome {
            shared_decimals: data(0)
                .and_then(oft::decode_shared_decimals)
                .filter(|d| *d > 0),
            name: data(1).and_then(|raw| erc20::decode_string(&NAME, raw)),
            symbol: data(2).and_then(|raw| erc20::decode_string(&SYMBOL, raw)),
            decimals: data(3).and_then(erc20::decode_decimals),
            send_probes,
        }
    }
}

/// Phase 3: one peer lookup per destination chain.
pub mod peers {
    use super::*;

    pub fn call(adapter: Address, version: EndpointVersion, dst_eid: u32) -> Result<Call, ethers::abi::Error> {
        let data = match version {
            EndpointVersion::V2 => oft::encode_peers(dst_eid)?,
            EndpointVersion::V1 => oft::encode_get_trusted_remote_address(dst_eid)?,
        };
        Ok(Call::new(adapter, data))
    }

    pub fn decode(version: EndpointVersion, result: &CallResult) -> Option<Address> {
        let raw = result.data()?;
        match version {
            EndpointVersion::V2 => oft::decode_peer(raw),
            EndpointVersion::V1 => oft::decode_trusted_remote(raw),
        }
    }
}
