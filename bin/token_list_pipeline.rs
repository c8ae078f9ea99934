//! # Token List Pipeline
//!
//! Batch runner for the omnichain token list. Each subcommand runs one stage and hands its
//! output to the next through a JSON snapshot; `all` runs every stage in memory and only
//! versions the published lists once, at the end.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --bin token_list_pipeline -- all
//! cargo run --bin token_list_pipeline -- verify --strict
//! ```

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::Value;

use omnichain_token_list::{
    adapter_resolver::{apply_metadata_rpcs, build_seeds, OftMetadata},
    dedup::{dedupe, DedupedLists},
    discovery::DiscoveryEngine,
    fee_enricher::FeeEnricher,
    multicall::MulticallWithFallback,
    reconcile::{sources::parse_token_list, sources::ReconcileInputs, split_inactive, Reconciled, Reconciler},
    rpc_registry::EndpointResolver,
    settings::Settings,
    snapshot,
    token_list::TokenList,
    types::{OftToken, TokenEntry},
    verify::verify,
};

#[derive(Parser, Debug)]
#[command(name = "token_list_pipeline", about = "Builds the omnichain token list")]
struct Cli {
    /// Serve Prometheus metrics on this address while running.
    #[cfg(feature = "observability")]
    #[arg(long, global = true)]
    metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed from the metadata file and run peer discovery to a fixed point.
    Discover,
    /// Quote fees and destination gas for every discovered peer link.
    Enrich,
    /// Reconcile the enriched snapshot with the external lists into token-list.json.
    Merge,
    /// Build inactive-token-list.json and drop logo-less records from the active list.
    Inactive,
    /// Merge duplicate records across both lists.
    Dedupe,
    /// Report peer symmetry, version and uniqueness problems.
    Verify {
        /// Exit non-zero when critical issues are found.
        #[arg(long)]
        strict: bool,
    },
    /// Every stage in order.
    All {
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    #[cfg(feature = "observability")]
    if let Some(addr) = cli.metrics_addr {
        omnichain_token_list::metrics::install_exporter(addr)?;
        info!("Metrics exporter listening on {}", addr);
    }

    let mut settings = Settings::new().context("loading settings")?;

    match cli.command {
        Command::Discover => {
            let discovered = discover(&mut settings).await?;
            write(&settings.paths.discovered_tokens, &discovered)?;
        }
        Command::Enrich => {
            let discovered: Vec<OftToken> = snapshot::read_json(&settings.paths.discovered_tokens)
                .context("reading discovered tokens")?;
            let enriched = enrich(&mut settings, discovered).await?;
            write(&settings.paths.enriched_tokens, &enriched)?;
        }
        Command::Merge => {
            let reconciled = merge(&settings)?;
            let list = TokenList::active(
                &settings.reconcile,
                reconciled.tokens,
                reconciled.root_tokens,
                Utc::now(),
            )
            .versioned_against(previous(&settings.paths.token_list).as_ref());
            write(&settings.paths.token_list, &list)?;
            write(&settings.paths.demoted_tokens, &reconciled.demoted)?;
        }
        Command::Inactive => {
            let mut active: TokenList =
                snapshot::read_json(&settings.paths.token_list).context("reading the active list")?;
            let demoted: Vec<TokenEntry> = snapshot::read_optional(&settings.paths.demoted_tokens)
                .context("reading demoted tokens")?
                .unwrap_or_default();
            let split = split_inactive(
                std::mem::take(&mut active.tokens),
                active.root_tokens.take().unwrap_or_default(),
                demoted,
                &inactive_sources(&settings)?,
                &settings.supported_chain_ids(),
            );
            active.tokens = split.tokens;
            active.root_tokens = Some(split.root_tokens);
            let inactive = TokenList::inactive(&settings.reconcile, split.inactive, Utc::now())
                .versioned_against(previous(&settings.paths.inactive_token_list).as_ref());
            write(&settings.paths.inactive_token_list, &inactive)?;
            write(&settings.paths.token_list, &active)?;
        }
        Command::Dedupe => {
            let mut active: TokenList =
                snapshot::read_json(&settings.paths.token_list).context("reading the active list")?;
            let mut inactive: TokenList = snapshot::read_json(&settings.paths.inactive_token_list)
                .context("reading the inactive list")?;
            let lists = dedupe(
                std::mem::take(&mut active.tokens),
                active.root_tokens.take().unwrap_or_default(),
                std::mem::take(&mut inactive.tokens),
            );
            let DedupedLists {
                tokens,
                root_tokens,
                inactive: inactive_tokens,
            } = lists;
            active.tokens = tokens;
            active.root_tokens = Some(root_tokens);
            inactive.tokens = inactive_tokens;
            write(&settings.paths.token_list, &active)?;
            write(&settings.paths.inactive_token_list, &inactive)?;
        }
        Command::Verify { strict } => {
            let active: TokenList =
                snapshot::read_json(&settings.paths.token_list).context("reading the active list")?;
            let inactive: Option<TokenList> = snapshot::read_optional(&settings.paths.inactive_token_list)
                .context("reading the inactive list")?;
            check(&active, inactive.as_ref(), strict)?;
        }
        Command::All { strict } => run_all(&mut settings, strict).await?,
    }
    Ok(())
}

async fn discover(settings: &mut Settings) -> Result<Vec<OftToken>> {
    let metadata: OftMetadata =
        snapshot::read_json(&settings.paths.oft_metadata).context("reading OFT metadata")?;
    let baseline = parse_token_list(
        snapshot::read_json::<Value>(&settings.paths.baseline_tokens).context("reading baseline tokens")?,
    );
    apply_metadata_rpcs(&mut settings.chains, &metadata);

    let seeds = build_seeds(settings, &metadata, &baseline);
    info!("Seeded {} tokens from {} chains of metadata", seeds.len(), metadata.len());

    let resolver = EndpointResolver::new(&settings.rpc).context("building endpoint resolver")?;
    let caller = MulticallWithFallback::new(resolver, settings.rpc.clone());
    let engine = DiscoveryEngine::new(&caller, settings).context("building probe calldata")?;
    let outcome = engine.run(seeds).await;
    info!(
        "Discovery settled after {} rounds: {} tokens, {} removed",
        outcome.rounds,
        outcome.tokens.len(),
        outcome.removed
    );
    Ok(outcome.tokens)
}

async fn enrich(settings: &mut Settings, tokens: Vec<OftToken>) -> Result<Vec<OftToken>> {
    // Metadata RPCs are optional here; discovery may have run in another process.
    match snapshot::read_optional::<OftMetadata>(&settings.paths.oft_metadata) {
        Ok(Some(metadata)) => apply_metadata_rpcs(&mut settings.chains, &metadata),
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable OFT metadata: {}", e),
    }
    let resolver = EndpointResolver::new(&settings.rpc).context("building endpoint resolver")?;
    let caller = MulticallWithFallback::new(resolver, settings.rpc.clone());
    Ok(FeeEnricher::new(&caller, settings).enrich(tokens).await)
}

fn merge(settings: &Settings) -> Result<Reconciled> {
    let inputs = ReconcileInputs::load(&settings.paths).context("loading reconcile inputs")?;
    Ok(Reconciler::new(settings).reconcile(&inputs))
}

fn inactive_sources(settings: &Settings) -> Result<Vec<Vec<TokenEntry>>> {
    let mut lists = Vec::new();
    for path in &settings.paths.inactive_sources {
        match snapshot::read_optional::<Value>(path).with_context(|| format!("reading {}", path))? {
            Some(raw) => lists.push(parse_token_list(raw)),
            None => warn!("Inactive source {} not found", path),
        }
    }
    Ok(lists)
}

/// The previously published list, if it can be read.
fn previous(path: &str) -> Option<TokenList> {
    match snapshot::read_optional(path) {
        Ok(list) => list,
        Err(e) => {
            warn!("Ignoring previous list {}: {}", path, e);
            None
        }
    }
}

fn write<T: serde::Serialize>(path: &str, value: &T) -> Result<()> {
    snapshot::write_json(path, value).with_context(|| format!("writing {}", path))?;
    info!("Wrote {}", path);
    Ok(())
}

fn check(active: &TokenList, inactive: Option<&TokenList>, strict: bool) -> Result<()> {
    let report = verify(active, inactive);
    report.log();
    if strict && report.critical() > 0 {
        bail!("{} critical list issues", report.critical());
    }
    Ok(())
}

async fn run_all(settings: &mut Settings, strict: bool) -> Result<()> {
    let discovered = discover(settings).await?;
    write(&settings.paths.discovered_tokens, &discovered)?;

    let enriched = enrich(settings, discovered).await?;
    write(&settings.paths.enriched_tokens, &enriched)?;

    let reconciled = merge(settings)?;
    write(&settings.paths.demoted_tokens, &reconciled.demoted)?;

    let split = split_inactive(
        reconciled.tokens,
        reconciled.root_tokens,
        reconciled.demoted,
        &inactive_sources(settings)?,
        &settings.supported_chain_ids(),
    );
    let lists = dedupe(split.tokens, split.root_tokens, split.inactive);

    let now = Utc::now();
    let active = TokenList::active(&settings.reconcile, lists.tokens, lists.root_tokens, now)
        .versioned_against(previous(&settings.paths.token_list).as_ref());
    let inactive = TokenList::inactive(&settings.reconcile, lists.inactive, now)
        .versioned_against(previous(&settings.paths.inactive_token_list).as_ref());
    write(&settings.paths.token_list, &active)?;
    write(&settings.paths.inactive_token_list, &inactive)?;

    check(&active, Some(&inactive), strict)
}
