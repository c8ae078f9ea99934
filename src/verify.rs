//! Consistency checks over published lists.
//!
//! Peer asymmetry is reported here rather than repaired during discovery: each adapter's
//! on-chain peer table is the source of truth, and a one-sided link is a data-quality finding.

use ethers::types::Address;
use indexmap::IndexMap;
use log::{error, info, warn};
use std::collections::HashMap;
use std::fmt;

use crate::token_list::TokenList;
use crate::types::{ChainId, EndpointVersion, OftVersion, TokenEntry, TokenKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    /// `oftInfo` present without `peersInfo`.
    PeersInfoMissing { token: TokenKey },
    /// A peer that is not in the same list.
    PeerNotListed { token: TokenKey, peer: TokenKey },
    /// An `acrossInfo` sibling that is not in the same list.
    AcrossSiblingNotListed { token: TokenKey, sibling: TokenKey },
    PeerNotOft { token: TokenKey, peer: TokenKey },
    AsymmetricPeer { token: TokenKey, peer: TokenKey },
    /// The peer links back, but to a different address.
    PeerAddressMismatch { token: TokenKey, peer: TokenKey, listed: Address },
    SiblingNotAcross { token: TokenKey, sibling: TokenKey },
    AsymmetricAcross { token: TokenKey, sibling: TokenKey },
    VersionMismatch {
        token: TokenKey,
        oft_version: OftVersion,
        endpoint_version: Option<EndpointVersion>,
    },
    DuplicateKey { key: TokenKey, count: usize },
    DuplicateSymbol { chain_id: ChainId, symbol: String, count: usize },
}

impl Issue {
    /// Address mismatches and shared symbols are reported but do not break routing.
    pub fn is_critical(&self) -> bool {
        !matches!(
            self,
            Issue::PeerAddressMismatch { .. } | Issue::DuplicateSymbol { .. }
        )
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::PeersInfoMissing { token } => write!(f, "{}: peersInfo undefined", token),
            Issue::PeerNotListed { token, peer } => write!(f, "{}: peer not found: {}", token, peer),
            Issue::AcrossSiblingNotListed { token, sibling } => {
                write!(f, "{}: across info not found: {}", token, sibling)
            }
            Issue::PeerNotOft { token, peer } => write!(f, "{}: peer {} is not marked as OFT", token, peer),
            Issue::AsymmetricPeer { token, peer } => {
                write!(f, "{}: peer {} does not reference back to chain {}", token, peer, token.chain_id)
            }
            Issue::PeerAddressMismatch { token, peer, listed } => write!(
                f,
                "{}: peer {} references {:?} instead",
                token, peer, listed
            ),
            Issue::SiblingNotAcross { token, sibling } => {
                write!(f, "{}: across sibling {} is not marked as Across", token, sibling)
            }
            Issue::AsymmetricAcross { token, sibling } => write!(
                f,
                "{}: across sibling {} does not reference back to chain {}",
                token, sibling, token.chain_id
            ),
            Issue::VersionMismatch {
                token,
                oft_version,
                endpoint_version,
            } => write!(
                f,
                "{}: oftVersion {} with endpointVersion {:?}",
                token,
                u8::from(*oft_version),
                endpoint_version.map(u8::from)
            ),
            Issue::DuplicateKey { key, count } => write!(f, "{}: listed {} times", key, count),
            Issue::DuplicateSymbol { chain_id, symbol, count } => {
                write!(f, "chain {} has {} tokens with symbol {}", chain_id, count, symbol)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyReport {
    pub checked: usize,
    pub issues: Vec<Issue>,
}

impl VerifyReport {
    pub fn critical(&self) -> usize {
        self.issues.iter().filter(|i| i.is_critical()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn log(&self) {
        for issue in &self.issues {
            if issue.is_critical() {
                error!("{}", issue);
            } else {
                warn!("{}", issue);
            }
        }
        info!(
            "Verified {} tokens: {} issues ({} critical)",
            self.checked,
            self.issues.len(),
            self.critical()
        );
    }
}

/// Runs every check over the active list and, when given, the inactive list.
///
/// Peer and sibling existence is checked within each list; symmetry, version and symbol
/// checks run over both lists together; key uniqueness is checked per list.
pub fn verify(active: &TokenList, inactive: Option<&TokenList>) -> VerifyReport {
    let active_tokens: Vec<&TokenEntry> = active.all_tokens().collect();
    let inactive_tokens: Vec<&TokenEntry> = inactive.map(|l| l.all_tokens().collect()).unwrap_or_default();
    let all: Vec<&TokenEntry> = active_tokens.iter().chain(&inactive_tokens).copied().collect();

    let mut issues = Vec::new();
    for list in [&active_tokens, &inactive_tokens] {
        issues.extend(check_references(list));
        issues.extend(check_unique_keys(list));
    }
    let index = ListIndex::new(&all);
    for token in &all {
        issues.extend(check_peer_symmetry(token, &index));
        issues.extend(check_across_symmetry(token, &index));
        issues.extend(check_versions(token));
    }
    issues.extend(check_duplicate_symbols(&all));

    VerifyReport {
        checked: all.len(),
        issues,
    }
}

/// First record per key.
struct ListIndex<'a> {
    by_key: HashMap<TokenKey, &'a TokenEntry>,
}

impl<'a> ListIndex<'a> {
    fn new(tokens: &[&'a TokenEntry]) -> Self {
        let mut by_key = HashMap::new();
        for token in tokens {
            if let Some(key) = token.key() {
                by_key.entry(key).or_insert(*token);
            }
        }
        Self { by_key }
    }

    fn get(&self, key: &TokenKey) -> Option<&'a TokenEntry> {
        self.by_key.get(key).copied()
    }
}

fn check_references(tokens: &[&TokenEntry]) -> Vec<Issue> {
    let index = ListIndex::new(tokens);
    let mut issues = Vec::new();
    for token in tokens {
        let Some(key) = token.key() else {
            continue;
        };
        if let Some(info) = token.oft_info() {
            match info.peers_info {
                None => issues.push(Issue::PeersInfoMissing { token: key }),
                Some(peers) => {
                    for (chain_id, peer) in peers {
                        if peer.token_address.is_zero() {
                            continue;
                        }
                        let peer = TokenKey::new(chain_id, peer.token_address);
                        if index.get(&peer).is_none() {
                            issues.push(Issue::PeerNotListed { token: key, peer });
                        }
                    }
                }
            }
        }
        for (chain_id, sibling) in token.extensions.across_info() {
            let sibling = TokenKey::new(chain_id, sibling.address);
            if index.get(&sibling).is_none() {
                issues.push(Issue::AcrossSiblingNotListed { token: key, sibling });
            }
        }
    }
    issues
}

fn check_peer_symmetry(token: &TokenEntry, index: &ListIndex<'_>) -> Vec<Issue> {
    let mut issues = Vec::new();
    let Some(key) = token.key() else {
        return issues;
    };
    if !token.is_oft {
        return issues;
    }
    for (chain_id, address) in token.peers() {
        if address.is_zero() || chain_id == token.chain_id {
            continue;
        }
        let peer = TokenKey::new(chain_id, address);
        let Some(peer_token) = index.get(&peer).filter(|p| p.is_oft && p.oft_info().map_or(false, |i| i.peers_info.is_some())) else {
            issues.push(Issue::PeerNotOft { token: key, peer });
            continue;
        };
        match peer_token.peers().get(&token.chain_id) {
            None => issues.push(Issue::AsymmetricPeer { token: key, peer }),
            Some(back) if !back.is_zero() && *back != key.address => issues.push(Issue::PeerAddressMismatch {
                token: key,
                peer,
                listed: *back,
            }),
            Some(_) => {}
        }
    }
    issues
}

fn check_across_symmetry(token: &TokenEntry, index: &ListIndex<'_>) -> Vec<Issue> {
    let mut issues = Vec::new();
    let Some(key) = token.key() else {
        return issues;
    };
    if !token.is_across {
        return issues;
    }
    for (chain_id, sibling) in token.extensions.across_info() {
        if chain_id == token.chain_id {
            continue;
        }
        let sibling_key = TokenKey::new(chain_id, sibling.address);
        match index.get(&sibling_key).filter(|t| t.is_across) {
            None => issues.push(Issue::SiblingNotAcross {
                token: key,
                sibling: sibling_key,
            }),
            Some(target) if !target.extensions.across_info().contains_key(&token.chain_id) => {
                issues.push(Issue::AsymmetricAcross {
                    token: key,
                    sibling: sibling_key,
                })
            }
            Some(_) => {}
        }
    }
    issues
}

/// OFT v3 sits on endpoint v2, v1/v2 on endpoint v1.
fn check_versions(token: &TokenEntry) -> Option<Issue> {
    if !token.is_oft {
        return None;
    }
    let info = token.oft_info()?;
    let oft_version = info.oft_version?;
    if info.endpoint_version == Some(oft_version.endpoint_version()) {
        return None;
    }
    Some(Issue::VersionMismatch {
        token: token.key()?,
        oft_version,
        endpoint_version: info.endpoint_version,
    })
}

fn check_unique_keys(tokens: &[&TokenEntry]) -> Vec<Issue> {
    let mut counts: IndexMap<TokenKey, usize> = IndexMap::new();
    for token in tokens {
        if let Some(key) = token.key() {
            *counts.entry(key).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, count)| Issue::DuplicateKey { key, count })
        .collect()
}

fn check_duplicate_symbols(tokens: &[&TokenEntry]) -> Vec<Issue> {
    let mut counts: IndexMap<(ChainId, &str), usize> = IndexMap::new();
    for token in tokens {
        *counts.entry((token.chain_id, token.symbol.as_str())).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((chain_id, symbol), count)| Issue::DuplicateSymbol {
            chain_id,
            symbol: symbol.to_string(),
            count,
        })
        .collect()
}
