use ethers::abi::{Function, ParamType, StateMutability, Token};
use ethers::types::Bytes;
use once_cell::sync::Lazy;

use super::function;
use crate::multicall::{Call, CallResult};

/// `tryAggregate(bool requireSuccess, (address target, bytes callData)[] calls)
///     returns ((bool success, bytes returnData)[])`
pub static TRY_AGGREGATE: Lazy<Function> = Lazy::new(|| {
    function(
        "tryAggregate",
        vec![
            ParamType::Bool,
            ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bytes,
            ]))),
        ],
        vec![ParamType::Array(Box::new(ParamType::Tuple(vec![
            ParamType::Bool,
            ParamType::Bytes,
        ])))],
        StateMutability::View,
    )
});

/// Encodes a non-reverting batch: individual failures come back as `success = false`.
pub fn encode_try_aggregate(calls: &[Call]) -> Result<Bytes, ethers::abi::Error> {
    let call_tokens = calls
        .iter()
        .map(|call| {
            Token::Tuple(vec![
                Token::Address(call.target),
                Token::Bytes(call.call_data.to_vec()),
            ])
        })
        .collect();

    TRY_AGGREGATE
        .encode_input(&[Token::Bool(false), Token::Array(call_tokens)])
        .map(Bytes::from)
}

/// Decodes the `(bool,bytes)[]` result. `None` when the payload is not a well-formed result array.
pub fn decode_try_aggregate(raw: &[u8]) -> Option<Vec<CallResult>> {
    let results = TRY_AGGREGATE
        .decode_output(raw)
        .ok()?
        .into_iter()
        .next()?
        .into_array()?;

    results
        .into_iter()
        .map(|token| {
            let mut tuple = token.into_tuple()?;
            if tuple.len() != 2 {
                return None;
            }
            let return_data = tuple.pop()?.into_bytes()?;
            let success = tuple.pop()?.into_bool()?;
            Some(CallResult {
                success,
                return_data: Bytes::from(return_data),
            })
        })
        .collect()
}

/// Encodes results the way the contract returns them. Used by in-memory callers in tests.
pub fn encode_results(results: &[CallResult]) -> Vec<u8> {
    let tokens = results
        .iter()
        .map(|r| Token::Tuple(vec![Token::Bool(r.success), Token::Bytes(r.return_data.to_vec())]))
        .collect();
    ethers::abi::encode(&[Token::Array(tokens)])
}
