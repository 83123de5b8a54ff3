use chrono::{Duration, TimeZone, Utc};
use lampyris::advert::MeterReading;
use lampyris::store::ReadingStore;

fn reading(cumulative_kwh: f64, rate_kw: f64) -> MeterReading {
    MeterReading {
        battery: 88,
        cumulative_kwh,
        rate_kw,
    }
}

#[test]
fn readings_survive_reopen() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("readings.db");
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    {
        let mut store = ReadingStore::open_file(&path).unwrap();
        store.insert(t0, &reading(10.0, 0.5)).unwrap();
        store
            .insert(t0 + Duration::minutes(1), &reading(12.5, 0.6))
            .unwrap();
    }

    let store = ReadingStore::open_file(&path).unwrap();
    let rows = store.export_all().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, t0);
    assert_eq!(rows[0].battery, 88);
}

#[test]
fn interval_energy_follows_the_cumulative_chain() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store
        .insert(t0 + Duration::minutes(1), &reading(12.5, 0.6))
        .unwrap();
    store
        .insert(t0 + Duration::minutes(2), &reading(12.5, 0.0))
        .unwrap();

    let rows = store.export_all().unwrap();
    assert_eq!(rows[0].interval_kwh, None);
    assert!((rows[1].interval_kwh.unwrap() - 2.5).abs() < 1e-9);
    assert!((rows[2].interval_kwh.unwrap() - 0.0).abs() < 1e-9);
}

#[test]
fn reinserting_a_timestamp_keeps_one_row() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let t1 = t0 + Duration::minutes(1);

    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store.insert(t1, &reading(12.0, 0.6)).unwrap();
    // Same minute seen again with a newer cumulative total
    store.insert(t1, &reading(12.5, 0.7)).unwrap();

    let rows = store.export_all().unwrap();
    assert_eq!(rows.len(), 2);
    assert!((rows[1].total_kwh - 12.5).abs() < 1e-9);
    // Interval is still measured against the predecessor row, not the
    // replaced version of the same minute
    assert!((rows[1].interval_kwh.unwrap() - 2.5).abs() < 1e-9);
}

#[test]
fn gap_range_spans_unenriched_rows_only() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let t1 = t0 + Duration::minutes(1);
    let t2 = t0 + Duration::minutes(2);

    assert!(store.find_gap_range().unwrap().is_none());

    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store.insert(t1, &reading(11.0, 0.5)).unwrap();
    store.insert(t2, &reading(12.0, 0.5)).unwrap();

    let (from, to) = store.find_gap_range().unwrap().unwrap();
    assert_eq!(from, t0);
    assert_eq!(to, t2);

    // Enrich the first two minutes; the gap shrinks to the last row
    let filled = store.fill_carbon(150, "moderate", t0, t2).unwrap();
    assert_eq!(filled, 2);
    let (from, to) = store.find_gap_range().unwrap().unwrap();
    assert_eq!(from, t2);
    assert_eq!(to, t2);
}

#[test]
fn fill_carbon_skips_already_enriched_rows() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let t1 = t0 + Duration::minutes(1);

    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store.insert(t1, &reading(12.0, 0.6)).unwrap();

    let end = t1 + Duration::minutes(1);
    assert_eq!(store.fill_carbon(150, "moderate", t0, end).unwrap(), 2);
    // A second pass over the same range touches nothing
    assert_eq!(store.fill_carbon(999, "very high", t0, end).unwrap(), 0);

    let rows = store.export_all().unwrap();
    assert_eq!(rows[0].carbon_intensity, Some(150));
    assert_eq!(rows[1].carbon_intensity, Some(150));
    assert_eq!(rows[1].intensity_index.as_deref(), Some("moderate"));
}

#[test]
fn carbon_mass_multiplies_interval_energy() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let t1 = t0 + Duration::minutes(1);

    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store.insert(t1, &reading(12.0, 0.6)).unwrap();
    store
        .fill_carbon(150, "moderate", t0, t1 + Duration::minutes(1))
        .unwrap();

    let rows = store.export_all().unwrap();
    // First row has no interval, so no mass either
    assert_eq!(rows[0].carbon_g, None);
    assert!((rows[1].carbon_g.unwrap() - 300.0).abs() < 1e-9);
}

#[test]
fn replaced_row_loses_its_enrichment() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store
        .fill_carbon(150, "moderate", t0, t0 + Duration::minutes(1))
        .unwrap();
    store.insert(t0, &reading(10.2, 0.5)).unwrap();

    let rows = store.export_all().unwrap();
    assert_eq!(rows[0].carbon_intensity, None);
    let (from, _) = store.find_gap_range().unwrap().unwrap();
    assert_eq!(from, t0);
}

#[test]
fn export_is_ordered_by_time() {
    let mut store = ReadingStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    // Insert out of order
    store
        .insert(t0 + Duration::minutes(5), &reading(12.0, 0.5))
        .unwrap();
    store.insert(t0, &reading(10.0, 0.5)).unwrap();
    store
        .insert(t0 + Duration::minutes(2), &reading(11.0, 0.5))
        .unwrap();

    let rows = store.export_all().unwrap();
    let times: Vec<_> = rows.iter().map(|r| r.timestamp).collect();
    assert_eq!(
        times,
        vec![t0, t0 + Duration::minutes(2), t0 + Duration::minutes(5)]
    );
}
