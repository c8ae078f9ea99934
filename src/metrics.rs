// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

#[cfg(not(feature = "observability"))]
pub enum Unit {}

// No-op macros when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers descriptions for every pipeline metric. Call once at startup.
pub fn describe_metrics() {
    describe_histogram!(
        "token_list_multicall_batch_size",
        "Number of calls packed into one tryAggregate request."
    );
    describe_counter!(
        "token_list_rpc_failures_total",
        "Endpoint-level RPC failures, labeled by chain."
    );
    describe_counter!(
        "token_list_rpc_fallbacks_total",
        "Times a batch moved on to the next candidate endpoint."
    );
    describe_gauge!(
        "token_list_discovery_round",
        "Current peer discovery round."
    );
    describe_counter!(
        "token_list_discovered_tokens_total",
        "Token records synthesized from newly found peers."
    );
    describe_counter!(
        "token_list_removed_tokens_total",
        "Token records dropped for missing ERC-20 identity."
    );
    describe_counter!(
        "token_list_phase_failures_total",
        "Discovery phases skipped because the chain's batch failed."
    );
}

/// Installs the Prometheus recorder and HTTP listener.
#[cfg(feature = "observability")]
pub fn install_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

pub fn record_multicall_batch_size(size: usize) {
    histogram!("token_list_multicall_batch_size", size as f64);
}

pub fn increment_rpc_failures(chain: &str) {
    counter!("token_list_rpc_failures_total", 1, "chain" => chain.to_string());
}

pub fn increment_rpc_fallbacks(chain: &str) {
    counter!("token_list_rpc_fallbacks_total", 1, "chain" => chain.to_string());
}

pub fn gauge_discovery_round(round: usize) {
    gauge!("token_list_discovery_round", round as f64);
}

pub fn increment_discovered_tokens(chain: &str, count: u64) {
    counter!("token_list_discovered_tokens_total", count, "chain" => chain.to_string());
}

pub fn increment_removed_tokens(count: u64) {
    counter!("token_list_removed_tokens_total", count);
}

pub fn increment_phase_failures(chain: &str, phase: &'static str) {
    counter!(
        "token_list_phase_failures_total",
        1,
        "chain" => chain.to_string(),
        "phase" => phase
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        describe_metrics();
        record_multicall_batch_size(500);
        increment_rpc_failures("ethereum");
        increment_rpc_fallbacks("ethereum");
        gauge_discovery_round(3);
        increment_discovered_tokens("base", 2);
        increment_removed_tokens(1);
        increment_phase_failures("base", "peers");
    }
}
