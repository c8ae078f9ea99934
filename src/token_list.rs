//! Published list artifacts (`token-list.json`, `inactive-token-list.json`) and their
//! versioning against the previous snapshot.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::settings::Reconcile;
use crate::types::TokenEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
        }
    }
}

impl Version {
    pub fn bump_patch(self) -> Self {
        Self {
            patch: self.patch + 1,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenList {
    pub name: String,
    /// Unix seconds, as a string.
    pub timestamp: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_tokens: Option<Vec<TokenEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(rename = "logoURI", default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

pub fn unix_timestamp(now: DateTime<Utc>) -> String {
    now.timestamp().to_string()
}

impl TokenList {
    pub fn active(
        rules: &Reconcile,
        tokens: Vec<TokenEntry>,
        root_tokens: Vec<TokenEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: rules.list_name.clone(),
            timestamp: unix_timestamp(now),
            version: Version::default(),
            tokens,
            root_tokens: Some(root_tokens),
            tags: None,
            keywords: rules.keywords.clone(),
            logo_uri: rules.list_logo_uri.clone(),
        }
    }

    pub fn inactive(rules: &Reconcile, tokens: Vec<TokenEntry>, now: DateTime<Utc>) -> Self {
        Self {
            name: rules.inactive_list_name.clone(),
            timestamp: unix_timestamp(now),
            version: Version::default(),
            tokens,
            root_tokens: None,
            tags: Some(Map::new()),
            keywords: rules.keywords.clone(),
            logo_uri: rules.list_logo_uri.clone(),
        }
    }

    /// Equality ignoring `version` and `timestamp`.
    pub fn same_content(&self, other: &TokenList) -> bool {
        self.name == other.name
            && self.tokens == other.tokens
            && self.root_tokens == other.root_tokens
            && self.tags == other.tags
            && self.keywords == other.keywords
            && self.logo_uri == other.logo_uri
    }

    /// Carries version and timestamp over from `previous` when nothing changed; otherwise
    /// bumps the previous patch version and keeps the fresh timestamp.
    pub fn versioned_against(mut self, previous: Option<&TokenList>) -> Self {
        let Some(previous) = previous else {
            return self;
        };
        if self.same_content(previous) {
            info!("{}: no changes, keeping version {:?}", self.name, previous.version);
            self.version = previous.version;
            self.timestamp = previous.timestamp.clone();
        } else {
            self.version = previous.version.bump_patch();
            info!("{}: content changed, version bumped to {:?}", self.name, self.version);
        }
        self
    }

    pub fn root_tokens(&self) -> &[TokenEntry] {
        self.root_tokens.as_deref().unwrap_or(&[])
    }

    /// `tokens` followed by `rootTokens`.
    pub fn all_tokens(&self) -> impl Iterator<Item = &TokenEntry> {
        self.tokens.iter().chain(self.root_tokens())
    }
}
