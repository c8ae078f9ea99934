use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use indexmap::IndexMap;
use log::{debug, warn};
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::contracts::multicall3::{decode_try_aggregate, encode_try_aggregate};
use crate::error::RpcError;
use crate::metrics;
use crate::rpc_registry::EndpointResolver;
use crate::settings::{ChainConfig, Rpc};

/// A single read-only call to be batched in a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

impl Call {
    pub fn new(target: Address, call_data: Bytes) -> Self {
        Self { target, call_data }
    }
}

/// Outcome of one call inside a `tryAggregate` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl CallResult {
    /// Return data of a successful call, if any came back.
    pub fn data(&self) -> Option<&[u8]> {
        (self.success && !self.return_data.is_empty()).then(|| self.return_data.as_ref())
    }

    /// Any non-empty payload, revert data included.
    pub fn raw(&self) -> Option<&[u8]> {
        (!self.return_data.is_empty()).then(|| self.return_data.as_ref())
    }
}

/// Executes ordered batches of read-only calls against one chain.
///
/// Implementations must either return exactly one result per input call, in input order,
/// or fail as a whole.
#[async_trait]
pub trait BatchCaller: Send + Sync {
    async fn call_batch(&self, chain: &ChainConfig, calls: &[Call]) -> Result<Vec<CallResult>, RpcError>;
}

/// Multicall3 `tryAggregate` executor with endpoint fallback.
///
/// ## Behaviour
///
/// - **Coalescing**: identical `(target, callData)` pairs are sent once and fanned back out
/// - **Batching**: calls are chunked by `batch_size` with `batch_delay_ms` between chunks
/// - **Retries**: each chunk is retried with exponential backoff before the endpoint is abandoned
/// - **Fallback**: candidate endpoints are tried in order; the first endpoint to answer every
///   chunk supplies the whole result, so results are never stitched from two endpoints
pub struct MulticallWithFallback {
    resolver: EndpointResolver,
    settings: Rpc,
}

impl MulticallWithFallback {
    pub fn new(resolver: EndpointResolver, settings: Rpc) -> Self {
        Self { resolver, settings }
    }

    /// Override the chunk size. Zero sends every call in a single batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.settings.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay(mut self, delay_ms: u64) -> Self {
        self.settings.batch_delay_ms = delay_ms;
        self
    }

    fn multicall_address(&self, chain: &ChainConfig) -> Address {
        chain.multicall_address.unwrap_or(self.settings.multicall_address)
    }

    async fn run_on_endpoint(
        &self,
        url: &str,
        multicall_address: Address,
        calls: &[Call],
    ) -> Result<Vec<CallResult>, RpcError> {
        let provider = Provider::<Http>::try_from(url).map_err(|e| RpcError::Provider {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let chunk_size = if self.settings.batch_size == 0 {
            calls.len().max(1)
        } else {
            self.settings.batch_size
        };

        let mut results = Vec::with_capacity(calls.len());
        for (i, chunk) in calls.chunks(chunk_size).enumerate() {
            if i > 0 && self.settings.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.batch_delay_ms)).await;
            }
            metrics::record_multicall_batch_size(chunk.len());
            let chunk_results = self
                .execute_chunk(&provider, url, multicall_address, chunk)
                .await?;
            results.extend(chunk_results);
        }
        Ok(results)
    }

    async fn execute_chunk(
        &self,
        provider: &Provider<Http>,
        url: &str,
        multicall_address: Address,
        calls: &[Call],
    ) -> Result<Vec<CallResult>, RpcError> {
        let calldata = encode_try_aggregate(calls)?;
        let tx: TypedTransaction = TransactionRequest::new()
            .to(multicall_address)
            .data(calldata)
            .into();

        let timeout = Duration::from_secs(self.settings.request_timeout_seconds);
        let seconds = self.settings.request_timeout_seconds;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.settings.retry_base_delay_ms / 2).max(1))
            .max_delay(Duration::from_secs(5))
            .take(self.settings.max_retries);

        let tx = &tx;
        let response = Retry::spawn(strategy, move || async move {
            match tokio::time::timeout(timeout, provider.call(tx, None)).await {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(e)) => {
                    debug!("multicall attempt on {} failed: {}", url, e);
                    Err(RpcError::Provider {
                        url: url.to_string(),
                        message: e.to_string(),
                    })
                }
                Err(_) => Err(RpcError::Timeout {
                    url: url.to_string(),
                    seconds,
                }),
            }
        })
        .await?;

        let results = decode_try_aggregate(&response).ok_or_else(|| RpcError::MalformedResponse {
            url: url.to_string(),
            reason: "undecodable tryAggregate result".to_string(),
        })?;
        if results.len() != calls.len() {
            return Err(RpcError::MalformedResponse {
                url: url.to_string(),
                reason: format!("expected {} results, got {}", calls.len(), results.len()),
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl BatchCaller for MulticallWithFallback {
    async fn call_batch(&self, chain: &ChainConfig, calls: &[Call]) -> Result<Vec<CallResult>, RpcError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let (unique, original_indices) = coalesce(calls);
        debug!(
            "Multicall on {} coalesced {} calls into {}",
            chain.key,
            calls.len(),
            unique.len()
        );

        let endpoints = self.resolver.candidates(chain).await?;
        let multicall_address = self.multicall_address(chain);

        for (attempt, url) in endpoints.iter().enumerate() {
            if attempt > 0 {
                metrics::increment_rpc_fallbacks(&chain.key);
            }
            match self.run_on_endpoint(url, multicall_address, &unique).await {
                Ok(results) => return Ok(fan_out(&results, &original_indices)),
                Err(e) => {
                    metrics::increment_rpc_failures(&chain.key);
                    warn!("RPC {} failed for {}: {}", url, chain.key, e);
                }
            }
        }

        Err(RpcError::AllEndpointsFailed {
            chain: chain.key.clone(),
            attempts: endpoints.len(),
        })
    }
}

/// Deduplicates calls, returning the unique calls and, per input position, its unique index.
fn coalesce(calls: &[Call]) -> (Vec<Call>, Vec<usize>) {
    let mut unique_calls = IndexMap::new();
    let mut original_indices = Vec::with_capacity(calls.len());
    for call in calls {
        let (index, _) = unique_calls.insert_full(call.clone(), ());
        original_indices.push(index);
    }
    (unique_calls.into_keys().collect(), original_indices)
}

fn fan_out(unique_results: &[CallResult], original_indices: &[usize]) -> Vec<CallResult> {
    original_indices
        .iter()
        .map(|&i| unique_results[i].clone())
        .collect()
}
