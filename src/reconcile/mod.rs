//! # List Reconciler
//!
//! Folds the enriched OFT snapshot and the independently produced external lists into one
//! active token universe, and sets aside the OFT records that fall outside the per-chain
//! activity limits.
//!
//! ## Placement
//!
//! Records on the hub chain are kept in a separate root map keyed by address alone; every
//! other record is keyed by `(chainId, address)`. Two records for the same key are merged
//! with [`merge_token_data`], never kept side by side.
//!
//! ## Activity limits
//!
//! OFT records are grouped by the transitive closure of their `peersInfo` links. A group is
//! active when any member is allow-listed (partner or core symbol, or known to the
//! underlying-address registry). The remaining groups are admitted per chain, in input
//! order, until the chain's limit is reached; later groups are demoted as a whole. Status is
//! tracked per group, so a group demoted on one chain is demoted on every chain.

pub mod inactive;
pub mod peer_groups;
pub mod sources;

use ethers::types::Address;
use indexmap::map::Entry;
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::normalization::{encode_spaces, merge_token_data, order_tokens, MergePolicy};
use crate::settings::Settings;
use crate::types::{ChainId, TokenEntry, TokenKey};
use peer_groups::PeerGroups;
use sources::{across_entries, oft_entry, ReconcileInputs, RegistryList};

pub use inactive::{split_inactive, InactiveSplit};

/// Output of [`Reconciler::reconcile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub tokens: Vec<TokenEntry>,
    pub root_tokens: Vec<TokenEntry>,
    /// OFT records whose peer group was demoted.
    pub demoted: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupStatus {
    Active,
    Inactive,
}

/// Inserts `entry` at `key`; an occupied slot is merged under `policy`, or left untouched
/// when no policy is given.
fn merge_into<K: Hash + Eq>(
    map: &mut IndexMap<K, TokenEntry>,
    key: K,
    entry: TokenEntry,
    policy: Option<MergePolicy>,
) {
    match map.entry(key) {
        Entry::Occupied(mut slot) => {
            if let Some(policy) = policy {
                let merged = merge_token_data(slot.get(), &entry, policy);
                slot.insert(merged);
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(entry);
        }
    }
}

#[derive(Debug, Default)]
struct TokenMaps {
    tokens: IndexMap<TokenKey, TokenEntry>,
    roots: IndexMap<Address, TokenEntry>,
}

impl TokenMaps {
    fn place(&mut self, entry: TokenEntry, hub_chain_id: ChainId, policy: Option<MergePolicy>) {
        let Some(key) = entry.key() else {
            debug!("dropping {} on chain {}: no address", entry.symbol, entry.chain_id);
            return;
        };
        if entry.chain_id == hub_chain_id {
            merge_into(&mut self.roots, key.address, entry, policy);
        } else {
            merge_into(&mut self.tokens, key, entry, policy);
        }
    }
}

pub struct Reconciler<'a> {
    settings: &'a Settings,
    supported: Vec<ChainId>,
}

impl<'a> Reconciler<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            supported: settings.supported_chain_ids(),
        }
    }

    fn is_blocked(&self, entry: &TokenEntry) -> bool {
        let blocked = self.settings.reconcile.is_blocked(&entry.symbol);
        if blocked {
            warn!("skipping, blocked token {} on chain {}", entry.symbol, entry.chain_id);
        }
        blocked
    }

    pub fn reconcile(&self, inputs: &ReconcileInputs) -> Reconciled {
        let hub = self.settings.hub_chain_id;
        let mut maps = TokenMaps::default();

        for token in inputs.across.values() {
            for entry in across_entries(token, &self.supported) {
                if !self.is_blocked(&entry) {
                    maps.place(entry, hub, None);
                }
            }
        }

        let ofts = self.collect_ofts(inputs);
        let groups = peer_groups_of(&ofts);
        let status = self.assign_group_status(&ofts, &groups, &inputs.registry);

        // Placement reads the final per-group status, which keeps every chain consistent with
        // demotions decided while a later chain was being processed.
        let mut demoted: IndexMap<TokenKey, TokenEntry> = IndexMap::new();
        for (key, mut entry) in ofts {
            self.rewrite_native_peers(&mut entry);
            let group_status = groups.group_of(&key).and_then(|g| status.get(&g)).copied();
            if group_status == Some(GroupStatus::Inactive) {
                merge_into(&mut demoted, key, entry, Some(MergePolicy::IncomingIdentity));
            } else {
                maps.place(entry, hub, Some(MergePolicy::IncomingIdentity));
            }
        }

        let demoted_keys: HashSet<TokenKey> = demoted.values().flat_map(TokenEntry::keys).collect();
        let list_sources = inputs
            .uniswap
            .iter()
            .chain(&inputs.wrapped_natives)
            .chain(&inputs.registry.root_tokens)
            .chain(&inputs.additional)
            .chain(inputs.extra_lists.iter().flatten());
        for token in list_sources {
            if self.is_blocked(token) || !self.supported.contains(&token.chain_id) {
                continue;
            }
            let Some(address) = token.address.filter(|a| !a.is_zero()) else {
                continue;
            };
            if demoted_keys.contains(&TokenKey::new(token.chain_id, address)) {
                continue;
            }
            let mut entry = token.clone();
            entry.logo_uri = entry.logo_uri.filter(|l| !l.is_empty());
            maps.place(entry, hub, Some(MergePolicy::IncomingIdentity));
        }

        for token in &inputs.registry.tokens {
            if self.is_blocked(token) {
                continue;
            }
            let Some(underlying) = token.underlying_address else {
                warn!("registry token {} on chain {} has no underlying address", token.symbol, token.chain_id);
                continue;
            };
            let mut entry = token.clone();
            entry.logo_uri = entry.logo_uri.filter(|l| !l.is_empty());
            merge_into(
                &mut maps.tokens,
                TokenKey::new(token.chain_id, underlying),
                entry,
                Some(MergePolicy::Underlying),
            );
        }

        let wrapped = &inputs.wrapped_natives;
        let mut demoted: Vec<TokenEntry> = demoted.into_values().collect();
        demoted.sort_by(order_tokens);
        let reconciled = Reconciled {
            tokens: self.final_clean(maps.tokens.into_values(), wrapped),
            root_tokens: self.final_clean(maps.roots.into_values(), wrapped),
            demoted,
        };
        info!(
            "Reconciled {} tokens and {} root tokens, {} demoted",
            reconciled.tokens.len(),
            reconciled.root_tokens.len(),
            reconciled.demoted.len()
        );
        reconciled
    }

    /// Valid, non-blocked OFT records in input order, excluding native-asset adapters.
    fn collect_ofts(&self, inputs: &ReconcileInputs) -> Vec<(TokenKey, TokenEntry)> {
        let rules = &self.settings.reconcile;
        inputs
            .ofts
            .iter()
            .filter_map(|token| {
                let entry = oft_entry(token)?;
                if self.is_blocked(&entry) {
                    return None;
                }
                if rules.native_oft_adapter(token.chain_id, &token.address).is_some() {
                    warn!(
                        "skipping, native OFT adapter token {} on chain {}",
                        entry.symbol, entry.chain_id
                    );
                    return None;
                }
                Some((token.key(), entry))
            })
            .collect()
    }

    fn assign_group_status(
        &self,
        ofts: &[(TokenKey, TokenEntry)],
        groups: &PeerGroups,
        registry: &RegistryList,
    ) -> HashMap<usize, GroupStatus> {
        let rules = &self.settings.reconcile;
        let mut status = HashMap::new();

        for (key, entry) in ofts {
            if rules.is_allow_listed(&entry.symbol) || registry.contains(key) {
                if let Some(group) = groups.group_of(key) {
                    status.insert(group, GroupStatus::Active);
                }
            }
        }

        let mut by_chain: IndexMap<ChainId, Vec<&(TokenKey, TokenEntry)>> = IndexMap::new();
        for record in ofts {
            by_chain.entry(record.0.chain_id).or_default().push(record);
        }

        for (chain_id, records) in by_chain {
            let limit = rules.active_limit(chain_id, self.settings.hub_chain_id);
            let mut active = 0usize;
            for (key, entry) in records {
                if !entry.is_oft {
                    continue;
                }
                let Some(group) = groups.group_of(key) else {
                    continue;
                };
                match status.get(&group) {
                    Some(GroupStatus::Active) => active += 1,
                    Some(GroupStatus::Inactive) => {}
                    None if active < limit => {
                        status.insert(group, GroupStatus::Active);
                        active += 1;
                    }
                    None => {
                        status.insert(group, GroupStatus::Inactive);
                    }
                }
            }
            debug!("chain {}: {} active OFT groups (limit {})", chain_id, active, limit);
        }
        status
    }

    /// Peers that point at a native-asset adapter are redirected to its replacement.
    fn rewrite_native_peers(&self, entry: &mut TokenEntry) {
        let Some(mut info) = entry.oft_info() else {
            return;
        };
        let Some(peers) = info.peers_info.as_mut() else {
            return;
        };
        let mut changed = false;
        for (chain_id, peer) in peers.iter_mut() {
            if let Some(replacement) = self
                .settings
                .reconcile
                .native_oft_adapter(*chain_id, &peer.token_address)
            {
                peer.token_address = replacement;
                changed = true;
            }
        }
        if changed {
            entry.extensions.set_oft_info(&info);
        }
    }

    /// Keeps bridgeable, wrapped-native or swappable-chain records, then sorts.
    fn final_clean(&self, entries: impl Iterator<Item = TokenEntry>, wrapped: &[TokenEntry]) -> Vec<TokenEntry> {
        let no_swapping = &self.settings.reconcile.chains_with_no_swapping;
        let mut cleaned: Vec<TokenEntry> = entries
            .filter(|t| {
                t.is_across || t.is_oft || !no_swapping.contains(&t.chain_id) || is_wrapped_native(t, wrapped)
            })
            .map(|mut t| {
                t.logo_uri = t.logo_uri.map(|l| encode_spaces(&l));
                t
            })
            .collect();
        cleaned.sort_by(order_tokens);
        cleaned
    }
}

fn peer_groups_of(ofts: &[(TokenKey, TokenEntry)]) -> PeerGroups {
    let mut groups = PeerGroups::new();
    for (key, entry) in ofts {
        groups.insert(*key);
        if entry.is_oft {
            for (chain_id, peer) in entry.peers() {
                groups.link(*key, TokenKey::new(chain_id, peer));
            }
        }
    }
    groups
}

fn is_wrapped_native(token: &TokenEntry, wrapped: &[TokenEntry]) -> bool {
    wrapped.iter().any(|w| {
        w.chain_id == token.chain_id
            && ((token.address.is_some() && w.address == token.address)
                || (token.underlying_address.is_some() && w.underlying_address == token.underlying_address))
    })
}
