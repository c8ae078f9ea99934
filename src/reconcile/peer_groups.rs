//! Disjoint-set grouping of token keys.
//!
//! Used for OFT peer groups (a token and every chain variant it reaches through `peersInfo`)
//! and for duplicate detection, where records sharing any key collapse into one group.

use indexmap::IndexMap;
use std::hash::Hash;

use crate::types::TokenKey;

/// Union-find with union by rank and path halving.
#[derive(Debug, Clone)]
pub struct DisjointSet<K: Hash + Eq + Clone> {
    index: IndexMap<K, usize>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

pub type PeerGroups = DisjointSet<TokenKey>;

impl<K: Hash + Eq + Clone> Default for DisjointSet<K> {
    fn default() -> Self {
        Self {
            index: IndexMap::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }
}

impl<K: Hash + Eq + Clone> DisjointSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.parent.len();
        self.index.insert(key, i);
        self.parent.push(i);
        self.rank.push(0);
        i
    }

    pub fn link(&mut self, a: K, b: K) {
        let a = self.insert(a);
        let b = self.insert(b);
        let (ra, rb) = (self.find_mut(a), self.find_mut(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
    }

    fn find_mut(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn find(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    /// Representative of the key's group; stable until the next `link`.
    pub fn group_of(&self, key: &K) -> Option<usize> {
        self.index.get(key).map(|&i| self.find(i))
    }
}
