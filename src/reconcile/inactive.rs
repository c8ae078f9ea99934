//! Inactive list assembly: demoted OFT groups, records without a logo and the configured
//! inactive-source lists, minus anything that is still active.

use indexmap::IndexMap;
use std::collections::HashSet;

use super::merge_into;
use crate::normalization::{order_tokens, MergePolicy};
use crate::types::{ChainId, TokenEntry, TokenKey};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InactiveSplit {
    pub tokens: Vec<TokenEntry>,
    pub root_tokens: Vec<TokenEntry>,
    pub inactive: Vec<TokenEntry>,
}

/// Moves logo-less records out of the active lists and builds the inactive list.
///
/// Source lists are read first-wins per key and restricted to `supported` chains; demoted
/// and logo-less records are merged on top.
pub fn split_inactive(
    tokens: Vec<TokenEntry>,
    root_tokens: Vec<TokenEntry>,
    demoted: Vec<TokenEntry>,
    sources: &[Vec<TokenEntry>],
    supported: &[ChainId],
) -> InactiveSplit {
    let (tokens, tokens_without_logo): (Vec<_>, Vec<_>) = tokens.into_iter().partition(TokenEntry::has_logo);
    let (root_tokens, roots_without_logo): (Vec<_>, Vec<_>) =
        root_tokens.into_iter().partition(TokenEntry::has_logo);

    let mut candidates: IndexMap<TokenKey, TokenEntry> = IndexMap::new();
    for entry in sources.iter().flatten() {
        if !supported.contains(&entry.chain_id) {
            continue;
        }
        if let Some(key) = entry.key() {
            merge_into(&mut candidates, key, entry.clone(), None);
        }
    }
    for entry in demoted.into_iter().chain(tokens_without_logo).chain(roots_without_logo) {
        if let Some(key) = entry.key() {
            merge_into(&mut candidates, key, entry, Some(MergePolicy::IncomingIdentity));
        }
    }

    let active: HashSet<TokenKey> = tokens.iter().chain(&root_tokens).flat_map(TokenEntry::keys).collect();
    let mut inactive: Vec<TokenEntry> = candidates
        .into_values()
        .filter(|t| !t.keys().iter().any(|k| active.contains(k)))
        .map(|mut t| {
            if t.tags.is_none() {
                t.tags = Some(Vec::new());
            }
            t
        })
        .collect();
    inactive.sort_by(order_tokens);

    InactiveSplit {
        tokens,
        root_tokens,
        inactive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn token(chain_id: ChainId, byte: u8, logo: Option<&str>) -> TokenEntry {
        let mut t = TokenEntry::new(chain_id, Address::repeat_byte(byte), "T", "T", 18);
        t.logo_uri = logo.map(str::to_string);
        t
    }

    #[test]
    fn logo_less_records_move_to_inactive() {
        let split = split_inactive(
            vec![token(10, 1, Some("https://l")), token(10, 2, Some(""))],
            vec![token(42161, 3, None)],
            Vec::new(),
            &[],
            &[10, 42161],
        );
        assert_eq!(split.tokens.len(), 1);
        assert!(split.root_tokens.is_empty());
        let keys: Vec<_> = split.inactive.iter().map(|t| (t.chain_id, t.address)).collect();
        assert_eq!(
            keys,
            vec![
                (10, Some(Address::repeat_byte(2))),
                (42161, Some(Address::repeat_byte(3)))
            ]
        );
        assert!(split.inactive.iter().all(|t| t.tags.is_some()));
    }

    #[test]
    fn active_and_unsupported_records_never_become_inactive() {
        let source = vec![token(10, 1, Some("l")), token(10, 4, Some("l")), token(999, 5, Some("l"))];
        let split = split_inactive(
            vec![token(10, 1, Some("https://l"))],
            Vec::new(),
            vec![token(8453, 6, Some("l"))],
            &[source],
            &[10, 8453],
        );
        let addresses: Vec<_> = split.inactive.iter().map(|t| t.address).collect();
        assert_eq!(
            addresses,
            vec![Some(Address::repeat_byte(4)), Some(Address::repeat_byte(6))]
        );
    }

    #[test]
    fn first_source_wins_then_demoted_merge_on_top() {
        let mut first = token(10, 4, Some("first"));
        first.name = "First".into();
        let mut second = token(10, 4, Some("second"));
        second.name = "Second".into();
        let mut demoted = token(10, 4, None);
        demoted.is_oft = true;

        let split = split_inactive(Vec::new(), Vec::new(), vec![demoted], &[vec![first], vec![second]], &[10]);
        assert_eq!(split.inactive.len(), 1);
        let merged = &split.inactive[0];
        assert_eq!(merged.logo_uri.as_deref(), Some("first"));
        assert!(merged.is_oft);
    }
}
