use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use std::str::FromStr;

// Para addresses
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn checksummed(addr: &Address) -> String {
    to_checksum(addr, None)
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

pub fn u256_to_u8(value: U256) -> Option<u8> {
    (value.bits() <= 8).then(|| value.low_u32() as u8)
}

pub fn u256_to_u64(value: U256) -> Option<u64> {
    (value.bits() <= 64).then(|| value.low_u64())
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Serde helpers writing addresses in EIP-55 checksum form and accepting any casing on read.
pub mod checksum {
    use super::*;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &Address, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&checksummed(addr))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(d)?;
        string_to_address(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(addr: &Option<Address>, s: S) -> Result<S::Ok, S::Error> {
            match addr {
                Some(a) => s.serialize_str(&checksummed(a)),
                None => s.serialize_none(),
            }
        }

        /// Empty strings and `0x`/`0x00` placeholders read as `None`.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Address>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") | Some("0x") | Some("0x00") => Ok(None),
                Some(s) => string_to_address(s).map(Some).map_err(D::Error::custom),
            }
        }
    }
}
