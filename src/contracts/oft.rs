//! Omnichain fungible token (OFT) and OApp read surface, across all three adapter generations.
//!
//! The `send`/`sendFrom` fragments are never executed for real: they are probed with zeroed
//! arguments and the presence of return (or revert) data reveals which generation the adapter
//! implements.

use ethers::abi::{Function, ParamType, StateMutability, Token};
use ethers::types::{Address, Bytes, U256};
use once_cell::sync::Lazy;

use super::function;
use crate::types::conversions::u256_to_u8;

fn send_param_tuple() -> ParamType {
    // (uint32 dstEid, bytes32 to, uint256 amountLD, uint256 minAmountLD,
    //  bytes extraOptions, bytes composeMsg, bytes oftCmd)
    ParamType::Tuple(vec![
        ParamType::Uint(32),
        ParamType::FixedBytes(32),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Bytes,
        ParamType::Bytes,
        ParamType::Bytes,
    ])
}

fn fee_pair() -> ParamType {
    ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Uint(256)])
}

pub static ENDPOINT: Lazy<Function> =
    Lazy::new(|| function("endpoint", vec![], vec![ParamType::Address], StateMutability::View));

pub static LZ_ENDPOINT: Lazy<Function> = Lazy::new(|| {
    function(
        "lzEndpoint",
        vec![],
        vec![ParamType::Address],
        StateMutability::View,
    )
});

/// Proxy adapters expose the wrapped ERC-20 through `token()`.
pub static TOKEN: Lazy<Function> =
    Lazy::new(|| function("token", vec![], vec![ParamType::Address], StateMutability::View));

pub static SHARED_DECIMALS: Lazy<Function> = Lazy::new(|| {
    function(
        "sharedDecimals",
        vec![],
        vec![ParamType::Uint(8)],
        StateMutability::View,
    )
});

pub static SEND_V3: Lazy<Function> = Lazy::new(|| {
    function(
        "send",
        vec![send_param_tuple(), fee_pair(), ParamType::Address],
        vec![
            ParamType::Tuple(vec![
                ParamType::FixedBytes(32),
                ParamType::Uint(64),
                fee_pair(),
            ]),
            fee_pair(),
        ],
        StateMutability::Payable,
    )
});

pub static SEND_FROM_V2: Lazy<Function> = Lazy::new(|| {
    function(
        "sendFrom",
        vec![
            ParamType::Address,
            ParamType::Uint(16),
            ParamType::FixedBytes(32),
            ParamType::Uint(256),
            ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Address,
                ParamType::Bytes,
            ]),
        ],
        vec![],
        StateMutability::Payable,
    )
});

pub static SEND_FROM_V1: Lazy<Function> = Lazy::new(|| {
    function(
        "sendFrom",
        vec![
            ParamType::Address,
            ParamType::Uint(16),
            ParamType::Bytes,
            ParamType::Uint(256),
            ParamType::Address,
            ParamType::Address,
            ParamType::Bytes,
        ],
        vec![],
        StateMutability::Payable,
    )
});

pub static PEERS: Lazy<Function> = Lazy::new(|| {
    function(
        "peers",
        vec![ParamType::Uint(32)],
        vec![ParamType::FixedBytes(32)],
        StateMutability::View,
    )
});

pub static GET_TRUSTED_REMOTE_ADDRESS: Lazy<Function> = Lazy::new(|| {
    function(
        "getTrustedRemoteAddress",
        vec![ParamType::Uint(16)],
        vec![ParamType::Bytes],
        StateMutability::View,
    )
});

pub static QUOTE_OFT: Lazy<Function> = Lazy::new(|| {
    function(
        "quoteOFT",
        vec![send_param_tuple()],
        vec![
            // OFTLimit
            fee_pair(),
            // OFTFeeDetail[]
            ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Int(256),
                ParamType::String,
            ]))),
            // OFTReceipt (amountSentLD, amountReceivedLD)
            fee_pair(),
        ],
        StateMutability::View,
    )
});

pub static QUOTE_OFT_FEE: Lazy<Function> = Lazy::new(|| {
    function(
        "quoteOFTFee",
        vec![ParamType::Uint(16), ParamType::Uint(256)],
        vec![ParamType::Uint(256)],
        StateMutability::View,
    )
});

pub static MIN_DST_GAS_LOOKUP: Lazy<Function> = Lazy::new(|| {
    function(
        "minDstGasLookup",
        vec![ParamType::Uint(16), ParamType::Uint(16)],
        vec![ParamType::Uint(256)],
        StateMutability::View,
    )
});

fn zero_bytes32() -> Token {
    Token::FixedBytes(vec![0u8; 32])
}

/// Left-pads an address into a `bytes32` recipient.
pub fn address_to_bytes32(address: Address) -> Token {
    let mut out = vec![0u8; 12];
    out.extend_from_slice(address.as_bytes());
    Token::FixedBytes(out)
}

fn encode(f: &Function, args: &[Token]) -> Result<Bytes, ethers::abi::Error> {
    f.encode_input(args).map(Bytes::from)
}

pub fn encode_no_args(f: &Function) -> Result<Bytes, ethers::abi::Error> {
    encode(f, &[])
}

pub fn encode_send_v3_probe() -> Result<Bytes, ethers::abi::Error> {
    encode(
        &SEND_V3,
        &[
            Token::Tuple(vec![
                Token::Uint(U256::zero()),
                zero_bytes32(),
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
                Token::Bytes(vec![]),
                Token::Bytes(vec![]),
                Token::Bytes(vec![]),
            ]),
            Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::zero())]),
            Token::Address(Address::zero()),
        ],
    )
}

pub fn encode_send_from_v2_probe() -> Result<Bytes, ethers::abi::Error> {
    encode(
        &SEND_FROM_V2,
        &[
            Token::Address(Address::zero()),
            Token::Uint(U256::zero()),
            zero_bytes32(),
            Token::Uint(U256::zero()),
            Token::Tuple(vec![
                Token::Address(Address::zero()),
                Token::Address(Address::zero()),
                Token::Bytes(vec![]),
            ]),
        ],
    )
}

pub fn encode_send_from_v1_probe() -> Result<Bytes, ethers::abi::Error> {
    encode(
        &SEND_FROM_V1,
        &[
            Token::Address(Address::zero()),
            Token::Uint(U256::zero()),
            Token::Bytes(vec![]),
            Token::Uint(U256::zero()),
            Token::Address(Address::zero()),
            Token::Address(Address::zero()),
            Token::Bytes(vec![]),
        ],
    )
}

pub fn encode_peers(eid: u32) -> Result<Bytes, ethers::abi::Error> {
    encode(&PEERS, &[Token::Uint(U256::from(eid))])
}

pub fn encode_get_trusted_remote_address(eid: u32) -> Result<Bytes, ethers::abi::Error> {
    encode(&GET_TRUSTED_REMOTE_ADDRESS, &[Token::Uint(U256::from(eid))])
}

/// `quoteOFT` for sending `amount` to `recipient` on `dst_eid` with no minimum.
pub fn encode_quote_oft(
    dst_eid: u32,
    recipient: Address,
    amount: U256,
) -> Result<Bytes, ethers::abi::Error> {
    encode(
        &QUOTE_OFT,
        &[Token::Tuple(vec![
            Token::Uint(U256::from(dst_eid)),
            address_to_bytes32(recipient),
            Token::Uint(amount),
            Token::Uint(U256::zero()),
            Token::Bytes(vec![]),
            Token::Bytes(vec![]),
            Token::Bytes(vec![]),
        ])],
    )
}

pub fn encode_quote_oft_fee(dst_eid: u32, amount: U256) -> Result<Bytes, ethers::abi::Error> {
    encode(
        &QUOTE_OFT_FEE,
        &[Token::Uint(U256::from(dst_eid)), Token::Uint(amount)],
    )
}

/// Gas lookup for packet type 0 (plain send).
pub fn encode_min_dst_gas_lookup(dst_eid: u32) -> Result<Bytes, ethers::abi::Error> {
    encode(
        &MIN_DST_GAS_LOOKUP,
        &[Token::Uint(U256::from(dst_eid)), Token::Uint(U256::zero())],
    )
}

fn first_output(f: &Function, raw: &[u8]) -> Option<Token> {
    f.decode_output(raw).ok().and_then(|v| v.into_iter().next())
}

pub fn decode_address(f: &Function, raw: &[u8]) -> Option<Address> {
    first_output(f, raw).and_then(|t| t.into_address())
}

pub fn decode_uint(f: &Function, raw: &[u8]) -> Option<U256> {
    first_output(f, raw).and_then(|t| t.into_uint())
}

pub fn decode_shared_decimals(raw: &[u8]) -> Option<u8> {
    decode_uint(&SHARED_DECIMALS, raw).and_then(u256_to_u8)
}

/// `peers(eid)` stores the remote address left-padded in a `bytes32`; zero means unset.
pub fn decode_peer(raw: &[u8]) -> Option<Address> {
    let word = first_output(&PEERS, raw)?.into_fixed_bytes()?;
    if word.len() != 32 || word.iter().all(|b| *b == 0) {
        return None;
    }
    let address = Address::from_slice(&word[12..]);
    (!address.is_zero()).then_some(address)
}

/// Legacy trusted remotes are raw bytes: the remote address, optionally followed by the local one.
pub fn decode_trusted_remote(raw: &[u8]) -> Option<Address> {
    let path = first_output(&GET_TRUSTED_REMOTE_ADDRESS, raw)?.into_bytes()?;
    if path.len() < 20 {
        return None;
    }
    let address = Address::from_slice(&path[..20]);
    (!address.is_zero()).then_some(address)
}

/// Returns `(amountSentLD, amountReceivedLD)` from a `quoteOFT` receipt.
pub fn decode_quote_oft(raw: &[u8]) -> Option<(U256, U256)> {
    let outputs = QUOTE_OFT.decode_output(raw).ok()?;
    let receipt = outputs.into_iter().nth(2)?.into_tuple()?;
    let mut it = receipt.into_iter();
    let sent = it.next()?.into_uint()?;
    let received = it.next()?.into_uint()?;
    Some((sent, received))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode as abi_encode;
    use std::str::FromStr;

    fn addr(s: &str) -> Address {
        Address::from_str(s).unwrap()
    }

    #[test]
    fn peer_takes_low_twenty_bytes() {
        let peer = addr("0x1111111111111111111111111111111111111111");
        let raw = abi_encode(&[address_to_bytes32(peer)]);
        assert_eq!(decode_peer(&raw), Some(peer));

        let empty = abi_encode(&[Token::FixedBytes(vec![0u8; 32])]);
        assert_eq!(decode_peer(&empty), None);
    }

    #[test]
    fn trusted_remote_handles_both_path_shapes() {
        let remote = addr("0x2222222222222222222222222222222222222222");
        let local = addr("0x3333333333333333333333333333333333333333");

        let short = abi_encode(&[Token::Bytes(remote.as_bytes().to_vec())]);
        assert_eq!(decode_trusted_remote(&short), Some(remote));

        let mut full = remote.as_bytes().to_vec();
        full.extend_from_slice(local.as_bytes());
        let long = abi_encode(&[Token::Bytes(full)]);
        assert_eq!(decode_trusted_remote(&long), Some(remote));

        let none = abi_encode(&[Token::Bytes(vec![])]);
        assert_eq!(decode_trusted_remote(&none), None);
    }

    #[test]
    fn quote_oft_receipt_is_third_output() {
        let raw = abi_encode(&[
            Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::MAX)]),
            Token::Array(vec![]),
            Token::Tuple(vec![
                Token::Uint(U256::from(1_000u64)),
                Token::Uint(U256::from(995u64)),
            ]),
        ]);
        assert_eq!(
            decode_quote_oft(&raw),
            Some((U256::from(1_000u64), U256::from(995u64)))
        );
    }

    #[test]
    fn probes_encode_with_expected_selectors() {
        let v3 = encode_send_v3_probe().unwrap();
        assert_eq!(&v3[..4], &SEND_V3.short_signature());
        let v2 = encode_send_from_v2_probe().unwrap();
        let v1 = encode_send_from_v1_probe().unwrap();
        assert_ne!(&v2[..4], &v1[..4]);
    }
}
