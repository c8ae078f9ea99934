use thiserror::Error;

use crate::types::ChainId;

/// Failures of the batched RPC layer.
///
/// Only `NoEndpoints` and `AllEndpointsFailed` ever escape [`crate::multicall::BatchCaller`];
/// the other variants describe a single endpoint attempt and are folded into the fallback loop.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no RPC endpoints available for chain {chain}")]
    NoEndpoints { chain: String },
    #[error("all {attempts} RPC endpoints failed for chain {chain}")]
    AllEndpointsFailed { chain: String, attempts: usize },
    #[error("provider error on {url}: {message}")]
    Provider { url: String, message: String },
    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },
    #[error("abi error: {0}")]
    Abi(#[from] ethers::abi::Error),
    #[error("malformed multicall response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("chain registry error: {0}")]
    Registry(String),
}

/// Errors surfaced by the stage drivers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("unknown chain {0}")]
    UnknownChain(ChainId),
    #[error("missing input: {0}")]
    MissingInput(String),
}
