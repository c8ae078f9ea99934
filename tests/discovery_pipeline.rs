//! Discovery and fee enrichment against scripted chain state.
//!
//! Covers:
//! - Peer graph expansion to a fixed point from a single seed, and the round cap
//! - Proxy adapters resolving peers to the wrapped token
//! - v3 receipt quotes and legacy fee/gas lookups
//! - Enriched records feeding a list that verifies cleanly

mod common;

use chrono::Utc;
use ethers::types::Address;

use common::{eid_v2, seed, settings_for, MockAdapter, ScriptedChains};
use omnichain_token_list::reconcile::sources::oft_entry;
use omnichain_token_list::settings::Settings;
use omnichain_token_list::types::{ChainId, EndpointVersion, OftToken, OftVersion};
use omnichain_token_list::verify::{verify, Issue};
use omnichain_token_list::{DiscoveryEngine, FeeEnricher, TokenList};

const ETHEREUM: ChainId = 1;
const OPTIMISM: ChainId = 10;
const BASE: ChainId = 8453;

fn find(tokens: &[OftToken], chain_id: ChainId) -> &OftToken {
    tokens
        .iter()
        .find(|t| t.chain_id == chain_id)
        .unwrap_or_else(|| panic!("no token on chain {}", chain_id))
}

/// Fully meshed v3 deployments of one symbol, one adapter per chain.
fn meshed(settings: &Settings, chains: &[(ChainId, Address)], fee_bps: u64) -> ScriptedChains {
    let mut scripted = ScriptedChains::new();
    for &(chain_id, address) in chains {
        let mut adapter = MockAdapter::new(OftVersion::V3).fee(fee_bps);
        for &(other, remote) in chains.iter().filter(|(c, _)| *c != chain_id) {
            adapter = adapter.peer(eid_v2(settings, other), remote);
        }
        scripted = scripted.oft(chain_id, address, "USDX", 6, adapter);
    }
    scripted
}

#[tokio::test]
async fn three_chain_mesh_settles_from_one_seed() {
    let settings = settings_for(&[ETHEREUM, OPTIMISM, BASE]);
    let chains = [
        (ETHEREUM, Address::repeat_byte(0xa1)),
        (OPTIMISM, Address::repeat_byte(0xa2)),
        (BASE, Address::repeat_byte(0xa3)),
    ];
    let scripted = meshed(&settings, &chains, 0);

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let outcome = engine.run(vec![seed(&settings, ETHEREUM, chains[0].1)]).await;

    // round 1 finds both remotes, round 2 only sees known peers
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.removed, 0);
    assert_eq!(outcome.tokens.len(), 3);

    for &(chain_id, address) in &chains {
        let token = find(&outcome.tokens, chain_id);
        assert_eq!(token.address, address);
        assert_eq!(token.symbol.as_deref(), Some("USDX"));

        let peers = token.peers().unwrap();
        assert_eq!(peers.len(), 2, "every link of chain {} discovered", chain_id);
        for &(other, remote) in chains.iter().filter(|(c, _)| *c != chain_id) {
            assert_eq!(peers.get(&other), Some(&remote));
        }

        let bridge = token.bridge.bridge().unwrap();
        assert_eq!(bridge.oft_version, Some(OftVersion::V3));
        assert_eq!(bridge.endpoint_version, Some(EndpointVersion::V2));
        assert_eq!(bridge.endpoint_id, Some(eid_v2(&settings, chain_id)));
        assert_eq!(bridge.shared_decimals, Some(6));
    }
}

#[tokio::test]
async fn proxy_adapter_peers_resolve_to_wrapped_token() {
    let settings = settings_for(&[ETHEREUM, BASE]);
    let proxy = Address::repeat_byte(0xb1);
    let wrapped = Address::repeat_byte(0xc1);
    let remote = Address::repeat_byte(0xb2);

    let scripted = ScriptedChains::new()
        .proxy(
            ETHEREUM,
            proxy,
            wrapped,
            "PRX",
            18,
            MockAdapter::new(OftVersion::V3).peer(eid_v2(&settings, BASE), remote),
        )
        .oft(
            BASE,
            remote,
            "PRX",
            18,
            MockAdapter::new(OftVersion::V3).peer(eid_v2(&settings, ETHEREUM), proxy),
        );

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let outcome = engine.run(vec![seed(&settings, ETHEREUM, proxy)]).await;
    assert_eq!(outcome.tokens.len(), 2);

    let home = find(&outcome.tokens, ETHEREUM);
    assert_eq!(home.address, wrapped);
    assert_eq!(home.adapter(), Some(proxy));

    let away = find(&outcome.tokens, BASE);
    assert_eq!(away.peers().unwrap().get(&ETHEREUM), Some(&wrapped));
}

#[tokio::test]
async fn silent_contracts_are_removed() {
    let settings = settings_for(&[ETHEREUM, BASE]);
    let scripted = ScriptedChains::new();

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let outcome = engine
        .run(vec![seed(&settings, ETHEREUM, Address::repeat_byte(0xde))])
        .await;

    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.removed, 1);
    assert!(outcome.tokens.is_empty());
}

#[tokio::test]
async fn runaway_peer_chain_stops_at_round_cap() {
    let mut settings = settings_for(&[ETHEREUM, BASE]);
    settings.discovery.max_rounds = 3;

    // each adapter points at a fresh one on the other chain
    let hops: Vec<(ChainId, Address)> = (0..8u8)
        .map(|i| (if i % 2 == 0 { ETHEREUM } else { BASE }, Address::repeat_byte(0x60 + i)))
        .collect();
    let mut scripted = ScriptedChains::new();
    for (i, &(chain_id, address)) in hops.iter().enumerate() {
        let mut adapter = MockAdapter::new(OftVersion::V3);
        if let Some(&(next_chain, next)) = hops.get(i + 1) {
            adapter = adapter.peer(eid_v2(&settings, next_chain), next);
        }
        scripted = scripted.oft(chain_id, address, "RUN", 18, adapter);
    }

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let outcome = engine.run(vec![seed(&settings, ETHEREUM, hops[0].1)]).await;

    assert_eq!(outcome.rounds, 3);
    // the record synthesized in the last round is never probed
    assert_eq!(outcome.removed, 1);
    let mut found: Vec<Address> = outcome.tokens.iter().map(|t| t.address).collect();
    found.sort();
    let expected: Vec<Address> = hops[..3].iter().map(|&(_, a)| a).collect();
    assert_eq!(found, expected);
}

#[tokio::test]
async fn legacy_adapters_use_trusted_remotes_and_gas_lookup() {
    let settings = settings_for(&[ETHEREUM, BASE]);
    let eid_v1 = |chain_id: ChainId| settings.chain_by_id(chain_id).and_then(|c| c.eid_v1).unwrap();
    let home = Address::repeat_byte(0xd1);
    let away = Address::repeat_byte(0xd2);

    let mut home_adapter = MockAdapter::new(OftVersion::V2).peer(eid_v1(BASE), away).fee(30);
    home_adapter.min_dst_gas = 150_000;
    let away_adapter = MockAdapter::new(OftVersion::V2).peer(eid_v1(ETHEREUM), home).fee(30);

    let scripted = ScriptedChains::new()
        .oft(ETHEREUM, home, "LGC", 18, home_adapter)
        .oft(BASE, away, "LGC", 18, away_adapter);

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let discovered = engine.run(vec![seed(&settings, ETHEREUM, home)]).await.tokens;
    assert_eq!(discovered.len(), 2);

    let enriched = FeeEnricher::new(&scripted, &settings).enrich(discovered).await;

    let home_bridge = find(&enriched, ETHEREUM).bridge.bridge().unwrap();
    assert_eq!(home_bridge.oft_version, Some(OftVersion::V2));
    assert_eq!(home_bridge.endpoint_version, Some(EndpointVersion::V1));
    assert_eq!(home_bridge.endpoint_id, Some(eid_v1(ETHEREUM)));
    let to_base = home_bridge.fees.get(&BASE).unwrap();
    assert_eq!(to_base.oft_fee, Some(30));
    assert_eq!(to_base.min_dst_gas, Some(150_000));

    // a zero lookup falls back to the configured default
    let away_bridge = find(&enriched, BASE).bridge.bridge().unwrap();
    let to_ethereum = away_bridge.fees.get(&ETHEREUM).unwrap();
    assert_eq!(to_ethereum.min_dst_gas, Some(settings.fees.default_gas_for(ETHEREUM)));
}

#[tokio::test]
async fn fees_are_quoted_per_direction() {
    let settings = settings_for(&[ETHEREUM, BASE]);
    let home = Address::repeat_byte(0xe1);
    let away = Address::repeat_byte(0xe2);

    let scripted = ScriptedChains::new()
        .oft(
            ETHEREUM,
            home,
            "FEE",
            6,
            MockAdapter::new(OftVersion::V3).peer(eid_v2(&settings, BASE), away).fee(50),
        )
        .oft(
            BASE,
            away,
            "FEE",
            6,
            MockAdapter::new(OftVersion::V3).peer(eid_v2(&settings, ETHEREUM), home),
        );

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let discovered = engine.run(vec![seed(&settings, BASE, away)]).await.tokens;
    let enriched = FeeEnricher::new(&scripted, &settings).enrich(discovered).await;

    let home_fees = &find(&enriched, ETHEREUM).bridge.bridge().unwrap().fees;
    assert_eq!(home_fees.get(&BASE).and_then(|f| f.oft_fee), Some(50));
    assert!(!home_fees.contains_key(&ETHEREUM));

    // free routes still carry a fee entry
    let away_fees = &find(&enriched, BASE).bridge.bridge().unwrap().fees;
    assert_eq!(away_fees.get(&ETHEREUM).and_then(|f| f.oft_fee), Some(0));
    // v3 adapters never need a gas lookup
    assert_eq!(away_fees.get(&ETHEREUM).and_then(|f| f.min_dst_gas), None);
}

#[tokio::test]
async fn enriched_pair_publishes_a_clean_list() {
    let settings = settings_for(&[ETHEREUM, BASE]);
    let chains = [(ETHEREUM, Address::repeat_byte(0xf1)), (BASE, Address::repeat_byte(0xf2))];
    let scripted = meshed(&settings, &chains, 5);

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let discovered = engine.run(vec![seed(&settings, ETHEREUM, chains[0].1)]).await.tokens;
    let enriched = FeeEnricher::new(&scripted, &settings).enrich(discovered).await;

    let entries: Vec<_> = enriched.iter().filter_map(oft_entry).collect();
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert!(entry.is_oft);
        let info = entry.oft_info().unwrap();
        assert_eq!(info.oft_version, Some(OftVersion::V3));
        assert_eq!(info.endpoint_version, Some(EndpointVersion::V2));
        assert!(info.fee_info.is_some());
        assert_eq!(info.peers_info.map(|p| p.len()), Some(1));
    }

    let list = TokenList::active(&settings.reconcile, entries, Vec::new(), Utc::now());
    let report = verify(&list, None);
    assert!(report.is_clean(), "unexpected issues: {:?}", report.issues);
}

#[tokio::test]
async fn one_way_peer_is_reported() {
    let settings = settings_for(&[ETHEREUM, BASE]);
    let home = Address::repeat_byte(0x11);
    let away = Address::repeat_byte(0x12);

    // base never points back
    let scripted = ScriptedChains::new()
        .oft(
            ETHEREUM,
            home,
            "ONE",
            18,
            MockAdapter::new(OftVersion::V3).peer(eid_v2(&settings, BASE), away),
        )
        .oft(BASE, away, "ONE", 18, MockAdapter::new(OftVersion::V3));

    let engine = DiscoveryEngine::new(&scripted, &settings).unwrap();
    let discovered = engine.run(vec![seed(&settings, ETHEREUM, home)]).await.tokens;
    let enriched = FeeEnricher::new(&scripted, &settings).enrich(discovered).await;

    // the unconfirmed link is never quoted, and the peerless side loses its bridge data
    assert!(find(&enriched, ETHEREUM).bridge.bridge().unwrap().fees.is_empty());
    assert!(!find(&enriched, BASE).bridge.is_bridge());

    let entries: Vec<_> = enriched.iter().filter_map(oft_entry).collect();
    let list = TokenList::active(&settings.reconcile, entries, Vec::new(), Utc::now());
    let report = verify(&list, None);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, Issue::PeerNotOft { peer, .. } if peer.chain_id == BASE)));
    assert!(report.critical() > 0);
}
