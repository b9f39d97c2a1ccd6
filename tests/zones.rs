//! Zone lifecycle and persistence tests.

use std::time::Duration;

use zonesight::prelude::*;

const T0: i64 = 1_700_000_000_000;
const HOUR: i64 = 3_600_000;

fn draft(zone_type: ZoneType, low: f64, high: f64, created_at: i64) -> ZoneDraft {
    ZoneDraft {
        zone_type,
        high,
        low,
        created_at,
        metadata: ZoneMetadata {
            symbol: "EURUSD".to_string(),
            timeframe: "1h".to_string(),
            pattern_type: Some("DOUBLE_BOTTOM".to_string()),
            confidence: 0.75,
            ..Default::default()
        },
    }
}

fn gateway(store: &InMemoryZoneStore) -> ZoneGateway<InMemoryZoneStore> {
    ZoneGateway::new(
        store.clone(),
        ZoneRegistry::default(),
        "desk-1",
        GatewayConfig::default(),
    )
}

// ============================================================
// LIFECYCLE
// ============================================================

#[test]
fn test_demand_zone_retest_then_break() {
    let registry = ZoneRegistry::default();
    let id = registry.add_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).unwrap();

    let hits = registry.check_for_retests(105.0, T0 + 2 * HOUR);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id(), id);
    assert_eq!(
        registry.record_retest(&id, T0 + 2 * HOUR),
        Some(ZoneStatus::Tested1x)
    );

    // Inside the cooldown the touch is not counted again
    assert!(registry.check_for_retests(105.0, T0 + 2 * HOUR + HOUR / 2).is_empty());
    // Price outside the band never retests
    assert!(registry.check_for_retests(111.0, T0 + 10 * HOUR).is_empty());

    assert!(registry.check_zone_broken(&id, 99.0));
    assert_eq!(registry.get(&id).unwrap().status(), ZoneStatus::Broken);
    assert!(registry.get_active_zones().is_empty());
    assert!(!registry.check_zone_broken(&id, 95.0));
}

#[test]
fn test_three_retests_weaken_zone() {
    let registry = ZoneRegistry::default();
    let id = registry.add_zone(draft(ZoneType::Hfz, 120.0, 125.0, T0)).unwrap();

    let statuses: Vec<_> = (1..=3)
        .map(|n| registry.record_retest(&id, T0 + n * 2 * HOUR))
        .collect();
    assert_eq!(
        statuses,
        vec![
            Some(ZoneStatus::Tested1x),
            Some(ZoneStatus::Tested2x),
            Some(ZoneStatus::Weak)
        ]
    );

    assert!(registry.get_active_zones().is_empty());
    assert_eq!(registry.record_retest(&id, T0 + 20 * HOUR), None);
    assert_eq!(registry.get(&id).unwrap().retest_count(), 3);
}

#[test]
fn test_supply_zone_ignores_close_inside_band() {
    let registry = ZoneRegistry::default();
    let id = registry.add_zone(draft(ZoneType::Hfz, 110.0, 120.0, T0)).unwrap();

    assert!(!registry.check_zone_broken(&id, 119.5));
    assert!(!registry.check_zone_broken(&id, 105.0));
    assert!(registry.check_zone_broken(&id, 120.5));
}

#[test]
fn test_trade_limit_retires_zone() {
    let registry = ZoneRegistry::default();
    let id = registry.add_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).unwrap();
    let trade = ZoneTrade {
        opened_at: T0 + HOUR,
        entry: 110.0,
        direction: Direction::Long,
        pnl: None,
    };

    assert_eq!(registry.record_trade(&id, trade.clone()), Some(1));
    assert_eq!(registry.get_active_zones().len(), 1);
    assert_eq!(registry.record_trade(&id, trade), Some(2));
    assert!(registry.get_active_zones().is_empty());

    let stats = registry.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total_trades, 2);
}

#[test]
fn test_active_zones_fresh_first() {
    let registry = ZoneRegistry::default();
    let older = registry.add_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).unwrap();
    let newer = registry.add_zone(draft(ZoneType::Lfz, 90.0, 95.0, T0 + HOUR)).unwrap();
    let tested = registry.add_zone(draft(ZoneType::Lfz, 80.0, 85.0, T0 + 2 * HOUR)).unwrap();
    registry.record_retest(&tested, T0 + 5 * HOUR);

    let ids: Vec<String> = registry
        .get_active_zones()
        .iter()
        .map(|z| z.id().to_string())
        .collect();
    assert_eq!(ids, vec![newer, older, tested]);
}

#[test]
fn test_cleanup_purges_old_zones() {
    let registry = ZoneRegistry::default();
    registry.add_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).unwrap();
    registry.add_zone(draft(ZoneType::Lfz, 90.0, 95.0, T0 + 20 * 24 * HOUR)).unwrap();

    assert_eq!(registry.cleanup(T0 + 31 * 24 * HOUR), 1);
    assert_eq!(registry.stats().total, 1);
    assert_eq!(registry.get_active_zones().len(), 1);
}

#[test]
fn test_invalid_draft_rejected() {
    let registry = ZoneRegistry::default();
    assert!(registry.add_zone(draft(ZoneType::Lfz, 110.0, 100.0, T0)).is_err());

    let mut bad = draft(ZoneType::Lfz, 100.0, 110.0, T0);
    bad.metadata.confidence = 75.0;
    assert!(registry.add_zone(bad).is_err());
    assert_eq!(registry.stats().total, 0);
}

// ============================================================
// GATEWAY
// ============================================================

#[tokio::test]
async fn test_save_adopts_store_id() {
    let store = InMemoryZoneStore::new();
    let gateway = gateway(&store);

    let id = gateway.save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).await.unwrap();
    assert_eq!(id, "zone-1");
    assert!(gateway.local().get("zone-1").is_some());

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "zone-1");
    assert_eq!(rows[0].owner_id, "desk-1");
    assert_eq!(rows[0].status, "FRESH");
}

#[tokio::test]
async fn test_failing_store_keeps_local_id() {
    let store = InMemoryZoneStore::new();
    store.set_failing(true);
    let gateway = gateway(&store);

    let zone = draft(ZoneType::Lfz, 100.0, 110.0, T0);
    let local_id = zone.local_id();
    let id = gateway.save_zone(zone).await.unwrap();

    assert_eq!(id, local_id);
    assert!(gateway.local().get(&local_id).is_some());
    assert_eq!(gateway.get_zone_stats().active, 1);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_falls_back_to_local() {
    let store = InMemoryZoneStore::new();
    let gateway = gateway(&store);
    let id = gateway.save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).await.unwrap();

    store.set_latency(Some(Duration::from_secs(20)));

    let zones = gateway.load_zones(&ZoneScope::symbol("EURUSD")).await;
    assert_eq!(zones.len(), 1);

    assert_eq!(
        gateway.update_zone_retest(&id, T0 + 2 * HOUR).await,
        Some(ZoneStatus::Tested1x)
    );
    // The push timed out; the store still has the old status
    assert_eq!(store.rows()[0].status, "FRESH");

    let other = draft(ZoneType::Hfz, 130.0, 135.0, T0);
    let local_id = other.local_id();
    assert_eq!(gateway.save_zone(other).await.unwrap(), local_id);
}

#[tokio::test]
async fn test_round_trip_through_store() {
    let store = InMemoryZoneStore::new();
    let writer = gateway(&store);
    writer.save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).await.unwrap();
    writer.save_zone(draft(ZoneType::Hfz, 130.0, 135.0, T0 + HOUR)).await.unwrap();

    let reader = gateway(&store);
    let zones = reader.load_zones(&ZoneScope::symbol("EURUSD").with_timeframe("1h")).await;
    assert_eq!(zones.len(), 2);

    // Newest first
    assert_eq!(zones[0].zone_type(), ZoneType::Hfz);
    let demand = &zones[1];
    let original = writer.local().get(demand.id()).unwrap();
    assert_eq!(demand.high(), original.high());
    assert_eq!(demand.low(), original.low());
    assert_eq!(demand.zone_type(), original.zone_type());
    assert_eq!(demand.status(), original.status());
    assert_eq!(demand.metadata().pattern_type.as_deref(), Some("DOUBLE_BOTTOM"));
}

#[tokio::test]
async fn test_load_keeps_live_local_state() {
    let store = InMemoryZoneStore::new();
    let gateway = gateway(&store);
    let id = gateway.save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).await.unwrap();

    // Retest only the local copy; the stored row stays FRESH
    gateway.local().record_retest(&id, T0 + 2 * HOUR);
    assert_eq!(store.rows()[0].status, "FRESH");

    let zones = gateway.load_zones(&ZoneScope::symbol("EURUSD")).await;
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].status(), ZoneStatus::Tested1x);
}

#[tokio::test]
async fn test_status_changes_reach_store() {
    let store = InMemoryZoneStore::new();
    let gateway = gateway(&store);
    let id = gateway.save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).await.unwrap();

    gateway.update_zone_retest(&id, T0 + 2 * HOUR).await;
    let row = &store.rows()[0];
    assert_eq!(row.status, "TESTED_1X");
    assert_eq!(row.retest_count, 1);
    assert_eq!(row.last_tested_at, Some(T0 + 2 * HOUR));

    assert!(!gateway.mark_zone_broken(&id, 100.5).await);
    assert!(gateway.mark_zone_broken(&id, 99.0).await);
    assert_eq!(store.rows()[0].status, "BROKEN");
    assert!(gateway.get_active_zones().is_empty());

    assert_eq!(gateway.update_zone_retest("zone-42", T0).await, None);
}

#[tokio::test]
async fn test_delete_zone() {
    let store = InMemoryZoneStore::new();
    let gateway = gateway(&store);
    let id = gateway.save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0)).await.unwrap();

    assert!(gateway.delete_zone(&id).await);
    assert!(gateway.local().get(&id).is_none());
    assert!(store.rows()[0].deleted);
    assert!(!gateway.delete_zone(&id).await);

    let reader = ZoneGateway::new(
        store.clone(),
        ZoneRegistry::default(),
        "desk-1",
        GatewayConfig::default(),
    );
    assert!(reader.load_zones(&ZoneScope::symbol("EURUSD")).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_during_insert_leaves_no_live_row() {
    let store = InMemoryZoneStore::new();
    store.set_latency(Some(Duration::from_millis(100)));
    let writer = gateway(&store);

    let zone = draft(ZoneType::Lfz, 100.0, 110.0, T0);
    let local_id = zone.local_id();
    let (saved, deleted) = tokio::join!(writer.save_zone(zone), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.delete_zone(&local_id).await
    });

    assert_eq!(saved.unwrap(), local_id);
    assert!(deleted);
    assert!(writer.local().get(&local_id).is_none());
    assert!(writer.local().get("zone-1").is_none());

    // The row inserted after the delete is tombstoned, not resurrected
    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].deleted);

    store.set_latency(None);
    let reader = gateway(&store);
    assert!(reader.load_zones(&ZoneScope::symbol("EURUSD")).await.is_empty());
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let store = InMemoryZoneStore::new();
    gateway(&store)
        .save_zone(draft(ZoneType::Lfz, 100.0, 110.0, T0))
        .await
        .unwrap();

    let stranger = ZoneGateway::new(
        store.clone(),
        ZoneRegistry::default(),
        "desk-2",
        GatewayConfig::default(),
    );
    assert!(stranger.load_zones(&ZoneScope::symbol("EURUSD")).await.is_empty());
}

// ============================================================
// DETECTION TO STORAGE
// ============================================================

#[tokio::test]
async fn test_zone_result_is_persisted() {
    let history: Vec<Candle> = (0..40)
        .map(|i| {
            let p = 100.0 + (i as f64 * 0.7).sin() * 3.0;
            Candle::new(p, p + 1.0, p - 1.0, p, T0 + i * HOUR)
        })
        .collect();
    let pause = &history[30..34];

    let request = ZoneRequest {
        symbol: "EURUSD",
        timeframe: "1h",
        zone_type: ZoneType::Lfz,
        pause,
        history: &history,
        current_price: history[39].close,
        pattern_type: Some(PatternType::DoubleBottom),
        confidence: 0.7,
        pattern_height: None,
        created_at: history[39].timestamp,
    };
    let result = create_zone_result(&request, &TargetConfig::default()).unwrap();
    assert!(result.draft.high > result.draft.low);
    assert_eq!(result.boundaries.entry, result.draft.high);
    assert!(result.atr > 0.0);
    assert_eq!(result.draft.metadata.targets, vec![result.target.price]);

    let store = InMemoryZoneStore::new();
    let gateway = gateway(&store);
    let id = gateway.save_zone(result.draft.clone()).await.unwrap();
    let zone = gateway.local().get(&id).unwrap();
    assert_eq!(zone.high(), result.draft.high);
    assert_eq!(zone.metadata().entry, result.boundaries.entry);

    let empty = ZoneRequest {
        pause: &history[..0],
        ..request
    };
    assert!(create_zone_result(&empty, &TargetConfig::default()).is_none());
}
