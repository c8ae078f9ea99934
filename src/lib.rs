//! # Omnichain Token List
//!
//! Builds a canonical cross-chain token list from on-chain bridge state and a set of
//! independently maintained token lists.
//!
//! ## Overview
//!
//! The pipeline runs as a chain of stages, each producing a whole snapshot for the next:
//!
//! - **Discovery**: seeds OFT adapters from the messaging-layer metadata and probes them
//!   on-chain until every reachable peer on every supported chain is known
//! - **Enrichment**: quotes bridging fees and destination gas for every peer link
//! - **Reconciliation**: merges the on-chain view with the external lists and splits the
//!   result into active and inactive records
//! - **Deduplication**: folds records that share an address into one
//! - **Verification**: reports peer asymmetry and other consistency problems
//!
//! ## Architecture
//!
//! ### RPC Layer
//! All on-chain reads are batched through Multicall3 `tryAggregate` and retried across
//! the candidate endpoints of a chain ([`multicall::BatchCaller`]).
//!
//! ### Record Model
//! [`types::OftToken`] carries a token through discovery and enrichment, with its bridge
//! state as an explicit [`types::BridgeStatus`]; [`types::TokenEntry`] is the published
//! list record.

// Core Types
/// Token records, extensions and version enums
pub mod types;
/// Error taxonomy
pub mod error;

// RPC Layer
/// Multicall batching with endpoint fallback
pub mod multicall;
/// Candidate RPC endpoints per chain
pub mod rpc_registry;
/// Hand-built ABI fragments
pub mod contracts;

// Discovery & Enrichment
/// Adapter resolution and discovery seeds
pub mod adapter_resolver;
/// Round-based peer discovery
pub mod discovery;
/// Fee, gas and liveness enrichment
pub mod fee_enricher;

// Reconciliation
/// Address cleanup, record merging and ordering
pub mod normalization;
/// Multi-source merge and active/inactive split
pub mod reconcile;
/// Duplicate folding across lists
pub mod dedup;
/// Published list artifacts and versioning
pub mod token_list;
/// List consistency checks
pub mod verify;

// Infrastructure
/// JSON snapshot hand-off between stages
pub mod snapshot;
/// Metrics and observability
pub mod metrics;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use discovery::DiscoveryEngine;
pub use fee_enricher::FeeEnricher;
pub use multicall::{BatchCaller, MulticallWithFallback};
pub use reconcile::Reconciler;
pub use settings::Settings;
pub use token_list::TokenList;
