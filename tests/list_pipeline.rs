//! Offline list stages: reconcile from snapshot files, inactive split, dedup, versioning and
//! verification of the published pair.

mod common;

use chrono::{TimeZone, Utc};
use ethers::types::Address;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

use common::settings_for;
use omnichain_token_list::dedup::dedupe;
use omnichain_token_list::reconcile::sources::{parse_token_list, ReconcileInputs};
use omnichain_token_list::reconcile::split_inactive;
use omnichain_token_list::settings::Settings;
use omnichain_token_list::snapshot;
use omnichain_token_list::token_list::Version;
use omnichain_token_list::types::{
    BridgeStatus, ChainId, EndpointVersion, Extensions, OftBridge, OftToken, OftVersion, TokenEntry,
};
use omnichain_token_list::verify::verify;
use omnichain_token_list::{Reconciler, TokenList};

const ETHEREUM: ChainId = 1;
const OPTIMISM: ChainId = 10;
const BASE: ChainId = 8453;

fn oft(chain_id: ChainId, address: Address, symbol: &str, icon: Option<&str>, peers: &[(ChainId, Address)]) -> OftToken {
    let mut bridge = OftBridge::new(address);
    bridge.oft_version = Some(OftVersion::V3);
    bridge.endpoint_version = Some(EndpointVersion::V2);
    for &(c, a) in peers {
        bridge.peers.insert(c, a);
        bridge.fees.entry(c).or_default().oft_fee = Some(0);
    }
    OftToken {
        chain_key: chain_id.to_string(),
        chain_id,
        address,
        name: Some(format!("{} Token", symbol)),
        symbol: Some(symbol.to_string()),
        decimals: Some(18),
        icon: icon.map(str::to_string),
        extensions: Extensions::new(),
        bridge: BridgeStatus::BridgeToken(bridge),
        rest: Default::default(),
    }
}

fn path_in(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).display().to_string()
}

fn usdc(chain_id: ChainId) -> Address {
    match chain_id {
        ETHEREUM => Address::repeat_byte(0x01),
        _ => Address::repeat_byte(0x02),
    }
}

/// Writes the stage inputs into `dir` and points `settings` at them.
fn stage_inputs(dir: &TempDir, settings: &mut Settings) {
    let paths = &mut settings.paths;
    paths.across_tokens = path_in(dir, "across.json");
    paths.enriched_tokens = path_in(dir, "enriched.json");
    paths.registry_list = path_in(dir, "registry.json");
    paths.uniswap_list = path_in(dir, "uniswap.json");
    paths.wrapped_natives = path_in(dir, "wrapped.json");
    paths.additional_tokens = path_in(dir, "additional.json");
    paths.output_dir = dir.path().display().to_string();

    let across = json!({
        "USDC": {
            "name": "USD Coin",
            "symbol": "USDC",
            "decimals": 6,
            "coingeckoId": "usd-coin",
            "logoURI": "https://logos/usdc.png",
            "addresses": {
                "1": { "address": format!("{:?}", usdc(ETHEREUM)) },
                "8453": { "address": format!("{:?}", usdc(BASE)) }
            }
        }
    });
    snapshot::write_json(&paths.across_tokens, &across).unwrap();

    let usdx_eth = Address::repeat_byte(0x11);
    let usdx_base = Address::repeat_byte(0x12);
    let dim_op = Address::repeat_byte(0x21);
    let dim_base = Address::repeat_byte(0x22);
    let enriched = vec![
        oft(ETHEREUM, usdx_eth, "USDX", Some("https://logos/usdx.png"), &[(BASE, usdx_base)]),
        oft(BASE, usdx_base, "USDX", Some("https://logos/usdx.png"), &[(ETHEREUM, usdx_eth)]),
        oft(OPTIMISM, dim_op, "DIM", None, &[(BASE, dim_base)]),
        oft(BASE, dim_base, "DIM", None, &[(OPTIMISM, dim_op)]),
    ];
    snapshot::write_json(&paths.enriched_tokens, &enriched).unwrap();

    // a second opinion on USDC, adding an id the Across map lacks
    let extra = json!({
        "tokens": [{
            "chainId": BASE,
            "address": format!("{:?}", usdc(BASE)),
            "name": "USD Coin",
            "symbol": "USDC",
            "decimals": 6,
            "extensions": { "coinMarketCapId": 3408 }
        }]
    });
    snapshot::write_json(dir.path().join("TOKEN_LIST_extra.json"), &extra).unwrap();
}

fn inactive_source() -> Vec<TokenEntry> {
    parse_token_list(json!([
        {
            "chainId": OPTIMISM,
            "address": format!("{:?}", Address::repeat_byte(0x31)),
            "name": "Retired", "symbol": "OLD", "decimals": 18,
            "logoURI": "https://logos/old.png"
        },
        {
            "chainId": ETHEREUM,
            "address": format!("{:?}", Address::repeat_byte(0x11)),
            "name": "Stale USDX", "symbol": "USDX", "decimals": 18
        },
        {
            "chainId": 999999,
            "address": format!("{:?}", Address::repeat_byte(0x32)),
            "name": "Elsewhere", "symbol": "ELS", "decimals": 18
        }
    ]))
}

fn build_lists(settings: &Settings, now: i64) -> (TokenList, TokenList) {
    let inputs = ReconcileInputs::load(&settings.paths).unwrap();
    let reconciled = Reconciler::new(settings).reconcile(&inputs);
    let split = split_inactive(
        reconciled.tokens,
        reconciled.root_tokens,
        reconciled.demoted,
        &[inactive_source()],
        &settings.supported_chain_ids(),
    );
    let lists = dedupe(split.tokens, split.root_tokens, split.inactive);
    let now = Utc.timestamp_opt(now, 0).single().unwrap();
    (
        TokenList::active(&settings.reconcile, lists.tokens, lists.root_tokens, now),
        TokenList::inactive(&settings.reconcile, lists.inactive, now),
    )
}

fn symbols(list: &TokenList) -> Vec<(ChainId, String)> {
    list.all_tokens().map(|t| (t.chain_id, t.symbol.clone())).collect()
}

#[test]
fn stages_split_records_between_both_lists() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings_for(&[ETHEREUM, OPTIMISM, BASE]);
    stage_inputs(&dir, &mut settings);

    let (active, inactive) = build_lists(&settings, 1_700_000_000);

    let mut active_symbols = symbols(&active);
    active_symbols.sort();
    assert_eq!(
        active_symbols,
        vec![
            (ETHEREUM, "USDC".to_string()),
            (ETHEREUM, "USDX".to_string()),
            (BASE, "USDC".to_string()),
            (BASE, "USDX".to_string()),
        ]
    );

    // logo-less OFTs and the source record; the active USDX and the unsupported chain are dropped
    let mut inactive_symbols = symbols(&inactive);
    inactive_symbols.sort();
    assert_eq!(
        inactive_symbols,
        vec![
            (OPTIMISM, "DIM".to_string()),
            (OPTIMISM, "OLD".to_string()),
            (BASE, "DIM".to_string()),
        ]
    );

    let base_usdc = active
        .tokens
        .iter()
        .find(|t| t.chain_id == BASE && t.symbol == "USDC")
        .unwrap();
    assert!(base_usdc.is_across);
    assert_eq!(base_usdc.extensions.coingecko_id(), Some("usd-coin"));
    assert_eq!(base_usdc.extensions.coin_market_cap_id(), Some(&json!(3408)));
    assert!(base_usdc.extensions.across_info().contains_key(&ETHEREUM));

    let report = verify(&active, Some(&inactive));
    assert_eq!(report.critical(), 0, "unexpected issues: {:?}", report.issues);
}

#[test]
fn dedupe_is_idempotent_on_published_lists() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings_for(&[ETHEREUM, OPTIMISM, BASE]);
    stage_inputs(&dir, &mut settings);

    let (active, inactive) = build_lists(&settings, 1_700_000_000);
    let again = dedupe(active.tokens.clone(), active.root_tokens().to_vec(), inactive.tokens.clone());

    assert_eq!(again.tokens, active.tokens);
    assert_eq!(again.root_tokens, active.root_tokens());
    assert_eq!(again.inactive, inactive.tokens);
}

#[test]
fn republishing_only_bumps_on_change() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings_for(&[ETHEREUM, OPTIMISM, BASE]);
    stage_inputs(&dir, &mut settings);
    let published = path_in(&dir, "out/token-list.json");

    let (first, _) = build_lists(&settings, 1_700_000_000);
    let first = first.versioned_against(None);
    snapshot::write_json(&published, &first).unwrap();

    let previous: Option<TokenList> = snapshot::read_optional(&published).unwrap();
    let (second, _) = build_lists(&settings, 1_700_086_400);
    let second = second.versioned_against(previous.as_ref());
    assert_eq!(second.version, first.version);
    assert_eq!(second.timestamp, first.timestamp);

    // a new OFT on a supported chain changes the content
    let mut enriched: Vec<OftToken> = snapshot::read_json(&settings.paths.enriched_tokens).unwrap();
    enriched.push(oft(OPTIMISM, Address::repeat_byte(0x41), "NEW", Some("https://logos/new.png"), &[]));
    snapshot::write_json(&settings.paths.enriched_tokens, &enriched).unwrap();

    let (third, _) = build_lists(&settings, 1_700_172_800);
    let third = third.versioned_against(previous.as_ref());
    assert_eq!(
        third.version,
        Version {
            patch: first.version.patch + 1,
            ..first.version
        }
    );
    assert_eq!(third.timestamp, "1700172800");
}

#[test]
fn missing_required_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings_for(&[ETHEREUM]);
    settings.paths.across_tokens = path_in(&dir, "absent.json");
    settings.paths.enriched_tokens = path_in(&dir, "absent-too.json");
    assert!(ReconcileInputs::load(&settings.paths).is_err());
    assert!(!Path::new(&settings.paths.across_tokens).exists());
}
