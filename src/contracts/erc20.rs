use ethers::abi::{Function, ParamType, StateMutability};
use once_cell::sync::Lazy;

use super::function;
use crate::types::conversions::u256_to_u8;

pub static NAME: Lazy<Function> =
    Lazy::new(|| function("name", vec![], vec![ParamType::String], StateMutability::View));

pub static SYMBOL: Lazy<Function> =
    Lazy::new(|| function("symbol", vec![], vec![ParamType::String], StateMutability::View));

pub static DECIMALS: Lazy<Function> = Lazy::new(|| {
    function(
        "decimals",
        vec![],
        vec![ParamType::Uint(8)],
        StateMutability::View,
    )
});

pub fn decode_string(f: &Function, raw: &[u8]) -> Option<String> {
    f.decode_output(raw)
        .ok()
        .and_then(|v| v.into_iter().next())
        .and_then(|t| t.into_string())
}

pub fn decode_decimals(raw: &[u8]) -> Option<u8> {
    DECIMALS
        .decode_output(raw)
        .ok()
        .and_then(|v| v.into_iter().next())
        .and_then(|t| t.into_uint())
        .and_then(u256_to_u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::types::U256;

    #[test]
    fn decodes_identity_fields() {
        let raw = encode(&[Token::String("USD Coin".to_string())]);
        assert_eq!(decode_string(&NAME, &raw).as_deref(), Some("USD Coin"));

        let raw = encode(&[Token::Uint(U256::from(6u8))]);
        assert_eq!(decode_decimals(&raw), Some(6));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decode_string(&SYMBOL, &[0x01, 0x02]), None);
        let too_big = encode(&[Token::Uint(U256::from(300u64))]);
        assert_eq!(decode_decimals(&too_big), None);
    }
}
