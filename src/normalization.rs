// src/normalization.rs
//
// Address canonicalization, token-record merging and deterministic ordering shared by every
// stage that combines records from more than one source.

use ethers::types::{Address, U256};
use serde_json::Value;
use std::cmp::Ordering;

use crate::types::conversions::checksummed;
use crate::types::TokenEntry;

/// Basis-point denominator.
pub const BPS: u64 = 10_000;

/// Safe multiply then divide: (a * b) / denom with U256, returning floor.
/// Handles overflow by saturating multiplication.
#[inline]
pub fn mul_div_floor(a: U256, b: U256, denom: U256) -> U256 {
    if a.is_zero() || b.is_zero() {
        return U256::zero();
    }
    if denom.is_zero() {
        return U256::zero(); // Avoid division by zero
    }
    let prod = a.saturating_mul(b);
    prod / denom
}

/// One whole token in base units (10^decimals), or `None` past the range of `U256`.
#[inline]
pub fn one_unit(decimals: u8) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(decimals))
}

/// Fee in basis points for a quote that sends `sent` and delivers `received`.
///
/// A zero `sent` is treated as an unusable route and priced at the maximum.
pub fn fee_bps(sent: U256, received: U256) -> u64 {
    if sent.is_zero() {
        return BPS;
    }
    let lost = sent.saturating_sub(received);
    let bps = mul_div_floor(lost, U256::from(BPS), sent);
    bps.min(U256::from(BPS)).low_u64()
}

/// Trims, lowercases and validates a 20-byte hex address. `None` for anything else.
pub fn clean_address(input: &str) -> Option<Address> {
    let trimmed = input.trim().to_ascii_lowercase();
    let hex_part = trimmed.strip_prefix("0x")?;
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let bytes = hex::decode(hex_part).ok()?;
    Some(Address::from_slice(&bytes))
}

pub fn encode_spaces(url: &str) -> String {
    url.replace(' ', "%20")
}

/// Which side keeps `name`/`symbol` when two records for the same token meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Later source wins identity; a non-empty incoming logo replaces the existing one.
    IncomingIdentity,
    /// Duplicate folding: the base record keeps identity; any incoming logo wins.
    ExistingIdentity,
    /// Registry records keyed by `underlyingAddress`: identity from incoming, `address` dropped.
    Underlying,
}

fn prefer_non_empty(primary: &str, fallback: &str) -> String {
    if primary.is_empty() {
        fallback.to_string()
    } else {
        primary.to_string()
    }
}

/// Field-level merge of two records for the same token.
///
/// Attributes present on `incoming` override, flags are OR-ed and extensions deep-merge,
/// so nothing carried by either side is lost.
pub fn merge_token_data(existing: &TokenEntry, incoming: &TokenEntry, policy: MergePolicy) -> TokenEntry {
    let (name, symbol) = match policy {
        MergePolicy::IncomingIdentity | MergePolicy::Underlying => (
            prefer_non_empty(&incoming.name, &existing.name),
            prefer_non_empty(&incoming.symbol, &existing.symbol),
        ),
        MergePolicy::ExistingIdentity => (
            prefer_non_empty(&existing.name, &incoming.name),
            prefer_non_empty(&existing.symbol, &incoming.symbol),
        ),
    };

    let logo_uri = match policy {
        MergePolicy::ExistingIdentity => incoming.logo_uri.clone().or_else(|| existing.logo_uri.clone()),
        _ => incoming
            .logo_uri
            .clone()
            .filter(|l| !l.is_empty())
            .or_else(|| existing.logo_uri.clone()),
    };

    let address = match policy {
        MergePolicy::Underlying => None,
        _ => incoming.address.or(existing.address),
    };

    let mut rest = existing.rest.clone();
    for (k, v) in &incoming.rest {
        if !v.is_null() {
            rest.insert(k.clone(), v.clone());
        }
    }

    TokenEntry {
        chain_id: incoming.chain_id,
        address,
        global_address: incoming.global_address.or(existing.global_address),
        local_address: incoming.local_address.or(existing.local_address),
        underlying_address: incoming.underlying_address.or(existing.underlying_address),
        name,
        symbol,
        decimals: incoming.decimals,
        logo_uri,
        tags: incoming.tags.clone().or_else(|| existing.tags.clone()),
        extensions: existing.extensions.merge(&incoming.extensions),
        is_across: existing.is_across || incoming.is_across,
        is_oft: existing.is_oft || incoming.is_oft,
        rest,
    }
}

/// Number of populated attributes (non-null, non-empty containers).
pub fn population_score(token: &TokenEntry) -> usize {
    match serde_json::to_value(token) {
        Ok(Value::Object(map)) => map
            .values()
            .filter(|v| match v {
                Value::Null => false,
                Value::Object(m) => !m.is_empty(),
                Value::Array(a) => !a.is_empty(),
                _ => true,
            })
            .count(),
        _ => 0,
    }
}

/// List order: by chain, then by checksummed address (or underlying address).
pub fn order_tokens(a: &TokenEntry, b: &TokenEntry) -> Ordering {
    a.chain_id.cmp(&b.chain_id).then_with(|| {
        let ka = a.primary_address().map(|x| checksummed(&x));
        let kb = b.primary_address().map(|x| checksummed(&x));
        ka.cmp(&kb)
    })
}
