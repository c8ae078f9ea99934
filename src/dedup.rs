//! # Deduplicator
//!
//! Final cleanup across the active and inactive lists. Records reachable from each other
//! through any shared `(chainId, address)` or `(chainId, underlyingAddress)` key form one
//! duplicate group and are folded into a single record.
//!
//! Within a group the least populated record is the base and richer records are merged into
//! it in order of increasing population, so nothing carried by any duplicate is lost. The
//! merged record lands in the most active list any member came from.
//!
//! The merged record only carries keys of its own group, so a second pass finds nothing left
//! to merge.

use indexmap::IndexMap;
use log::{debug, info};

use crate::normalization::{merge_token_data, order_tokens, population_score, MergePolicy};
use crate::reconcile::peer_groups::DisjointSet;
use crate::types::{TokenEntry, TokenKey};

/// Which list a record was read from, least active first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    Inactive,
    Active,
    Root,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupedLists {
    pub tokens: Vec<TokenEntry>,
    pub root_tokens: Vec<TokenEntry>,
    pub inactive: Vec<TokenEntry>,
}

impl DedupedLists {
    fn total(&self) -> usize {
        self.tokens.len() + self.root_tokens.len() + self.inactive.len()
    }
}

pub fn dedupe(tokens: Vec<TokenEntry>, root_tokens: Vec<TokenEntry>, inactive: Vec<TokenEntry>) -> DedupedLists {
    let input_len = tokens.len() + root_tokens.len() + inactive.len();
    let records: Vec<(Origin, TokenEntry)> = root_tokens
        .into_iter()
        .map(|t| (Origin::Root, t))
        .chain(tokens.into_iter().map(|t| (Origin::Active, t)))
        .chain(inactive.into_iter().map(|t| (Origin::Inactive, t)))
        .collect();

    let mut keys: DisjointSet<TokenKey> = DisjointSet::new();
    for (_, entry) in &records {
        let entry_keys = entry.keys();
        if let Some((first, rest)) = entry_keys.split_first() {
            keys.insert(*first);
            for key in rest {
                keys.link(*first, *key);
            }
        }
    }

    let mut groups: IndexMap<usize, Vec<(Origin, TokenEntry)>> = IndexMap::new();
    let mut out = DedupedLists::default();
    for (origin, entry) in records {
        match entry.key().and_then(|k| keys.group_of(&k)) {
            Some(group) => groups.entry(group).or_default().push((origin, entry)),
            // Keyless records have nothing to collide with.
            None => place(&mut out, origin, entry),
        }
    }

    let mut merged_groups = 0usize;
    for (_, mut members) in groups {
        let origin = members.iter().map(|(o, _)| *o).max().unwrap_or(Origin::Inactive);
        if members.len() > 1 {
            merged_groups += 1;
            debug!(
                "merging {} duplicates of {} on chain {}",
                members.len(),
                members[0].1.symbol,
                members[0].1.chain_id
            );
        }
        members.sort_by_key(|(_, t)| population_score(t));
        let mut members = members.into_iter().map(|(_, t)| t);
        let Some(base) = members.next() else {
            continue;
        };
        let merged = members.fold(base, |acc, next| merge_token_data(&acc, &next, MergePolicy::ExistingIdentity));
        place(&mut out, origin, merged);
    }

    out.tokens.sort_by(order_tokens);
    out.root_tokens.sort_by(order_tokens);
    out.inactive.sort_by(order_tokens);
    info!(
        "Deduplicated {} records into {} ({} groups merged)",
        input_len,
        out.total(),
        merged_groups
    );
    out
}

fn place(out: &mut DedupedLists, origin: Origin, entry: TokenEntry) {
    match origin {
        Origin::Root => out.root_tokens.push(entry),
        Origin::Active => out.tokens.push(entry),
        Origin::Inactive => out.inactive.push(entry),
    }
}
