//! Integration tests for retention and isolation in the series store.
//!
//! These drive the store on a manual clock so window arithmetic is exact.

use std::sync::Arc;
use std::time::Duration;

use teleseries::clock::{ManualClock, NANOS_PER_SEC};
use teleseries::retention::RetentionPolicy;
use teleseries::series::SeriesKey;
use teleseries::store::SeriesStore;
use teleseries::topic::TopicRouter;

fn secs(s: u64) -> u64 {
    s * NANOS_PER_SEC
}

/// Store tracking two cities on a manual clock starting at t=0.
fn city_store(window_secs: Option<u64>, max_points: Option<usize>) -> (SeriesStore, ManualClock) {
    let clock = ManualClock::at_secs(0);
    let router = TopicRouter::new(
        "bess/telemetria",
        ["cityA", "cityB"],
        ["potencia", "tensao", "corrente"],
    )
    .unwrap();
    let retention = RetentionPolicy::new(window_secs.map(Duration::from_secs), max_points).unwrap();
    (
        SeriesStore::with_clock(router, retention, Arc::new(clock.clone())),
        clock,
    )
}

#[test]
fn test_end_to_end_sixty_second_window() {
    let (store, clock) = city_store(Some(60), Some(100));
    let key = SeriesKey::new("cityA", "potencia");

    clock.set_secs(0);
    store.append(&key, secs(0), 10.0);
    clock.set_secs(30);
    store.append(&key, secs(30), 20.0);
    clock.set_secs(70);
    store.append(&key, secs(70), 30.0);

    // t=0 is out (70 - 0 > 60), t=30 survives (70 - 30 = 40 <= 60).
    assert_eq!(store.snapshot(&key), vec![(secs(30), 20.0), (secs(70), 30.0)]);
}

#[test]
fn test_window_bound_holds_for_irregular_rates() {
    let (store, clock) = city_store(Some(10), None);
    let key = SeriesKey::new("cityB", "tensao");

    // Bursty arrivals: gaps of 0..=6 seconds in a repeating pattern.
    let gaps = [0u64, 1, 1, 6, 0, 0, 3, 5, 2, 0, 4];
    let mut now = 0u64;
    for (i, gap) in gaps.iter().cycle().take(200).enumerate() {
        now += gap;
        clock.set_secs(now);
        store.append(&key, secs(now), f64::from(u32::try_from(i).unwrap()));

        let cutoff = secs(now).saturating_sub(secs(10));
        let window = store.snapshot(&key);
        assert!(!window.is_empty());
        assert!(window.iter().all(|&(t, _)| t >= cutoff), "stale entry at now={now}");
        assert!(window.iter().all(|&(t, _)| t <= secs(now)));
    }
}

#[test]
fn test_count_bound_holds_after_every_append() {
    let (store, clock) = city_store(None, Some(100));
    let key = SeriesKey::new("cityA", "corrente");

    for i in 0..1_000u32 {
        clock.set_secs(u64::from(i));
        store.append(&key, secs(u64::from(i)), f64::from(i));
        assert!(store.len(&key) <= 100);
    }
    assert_eq!(store.snapshot(&key).len(), 100);
}

#[test]
fn test_count_cap_wins_over_window() {
    // Everything is well inside an hour, but only 3 points fit.
    let (store, clock) = city_store(Some(3600), Some(3));
    let key = SeriesKey::new("cityA", "potencia");
    clock.set_secs(100);
    for i in 0..10u32 {
        store.append(&key, secs(100), f64::from(i));
    }
    let values: Vec<f64> = store.snapshot(&key).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![7.0, 8.0, 9.0]);
}

#[test]
#[allow(clippy::cast_precision_loss)]
fn test_eviction_is_fifo() {
    let (store, clock) = city_store(Some(5), Some(4));
    let key = SeriesKey::new("cityB", "potencia");

    // Values are append sequence numbers; any retained window must be a
    // contiguous run ending at the newest append.
    for i in 0..60u32 {
        clock.set_secs(u64::from(i / 2));
        store.append(&key, secs(u64::from(i / 2)), f64::from(i));

        let values: Vec<f64> = store.snapshot(&key).into_iter().map(|(_, v)| v).collect();
        let expected_start = f64::from(i) - (values.len() as f64 - 1.0);
        for (offset, value) in values.iter().enumerate() {
            assert_eq!(*value, expected_start + offset as f64);
        }
        assert_eq!(values.last().copied(), Some(f64::from(i)));
    }
}

#[test]
fn test_drained_series_accepts_new_data() {
    let (store, clock) = city_store(Some(60), Some(100));
    let key = SeriesKey::new("cityA", "tensao");

    store.append(&key, secs(0), 1.0);
    clock.set_secs(1_000);
    assert!(store.snapshot(&key).is_empty());

    store.append(&key, secs(1_000), 2.0);
    assert_eq!(store.snapshot(&key), vec![(secs(1_000), 2.0)]);
    assert_eq!(store.len(&key), 1);
}

#[test]
fn test_duplicates_are_kept_as_separate_points() {
    let (store, _) = city_store(Some(60), Some(100));
    let key = SeriesKey::new("cityA", "potencia");
    store.append(&key, 0, 5.0);
    store.append(&key, 0, 5.0);
    assert_eq!(store.snapshot(&key), vec![(0, 5.0), (0, 5.0)]);
}

#[test]
fn test_multi_entity_isolation() {
    let (store, clock) = city_store(Some(60), Some(100));
    clock.set_secs(1);
    let a = SeriesKey::new("cityA", "potencia");
    let b = SeriesKey::new("cityB", "potencia");

    for i in 0..50u32 {
        store.ingest("bess/telemetria/cityA/potencia", u64::from(i), 1000.0 + f64::from(i));
        store.ingest("bess/telemetria/cityB/potencia", u64::from(i), 2000.0 + f64::from(i));
    }

    let all = store.snapshot_all(&[a.clone(), b.clone()]);
    assert_eq!(all[&a].len(), 50);
    assert_eq!(all[&b].len(), 50);
    assert!(all[&a].iter().all(|&(_, v)| v < 2000.0));
    assert!(all[&b].iter().all(|&(_, v)| v >= 2000.0));
}

#[test]
fn test_reset_drops_old_keys_and_preregisters_new_ones() {
    let (store, _) = city_store(Some(60), Some(100));
    store.ingest("bess/telemetria/cityA/potencia", 0, 1.0);

    store.reset(TopicRouter::new("bess/telemetria", ["cityC"], ["potencia", "tensao"]).unwrap());

    assert_eq!(
        store.keys(),
        vec![SeriesKey::new("cityC", "potencia"), SeriesKey::new("cityC", "tensao")]
    );
    assert!(store.snapshot(&SeriesKey::new("cityA", "potencia")).is_empty());
    assert_eq!(store.ingest("bess/telemetria/cityA/potencia", 1, 1.0), None);
}
