mod common;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use tablestream::{
    Error, EventData, MemoryStore, Partition, Properties, RowKind, SqliteStore, Stream,
    TableConfig, TableStore,
};

fn run_all<S: TableStore>(store: &S) {
    five_events_produce_eleven_rows(store);
    stale_tag_is_a_concurrency_conflict(store);
    duplicate_id_in_later_append_is_detected(store);
    virtual_partitions_share_one_physical_partition(store);
    head_properties_survive_appends(store);
    chained_appends_keep_versions_gap_free(store);
    every_property_type_round_trips(store);
    non_finite_doubles_are_refused_before_submission(store);
}

fn five_events_produce_eleven_rows<S: TableStore>(store: &S) {
    let partition = Partition::new("shape").unwrap();
    let result = Stream::write(
        store,
        &Stream::new(partition.clone()),
        &common::identified_events("e", 5),
    )
    .unwrap();
    assert_eq!(result.stream.version, 5);

    let rows = common::all_rows(store, "shape");
    assert_eq!(rows.len(), 11);

    let kinds: Vec<RowKind> = rows
        .iter()
        .map(|row| RowKind::classify("", &row.row_key).unwrap())
        .collect();
    assert_eq!(kinds.iter().filter(|k| **k == RowKind::Head).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == RowKind::Event).count(), 5);
    assert_eq!(kinds.iter().filter(|k| **k == RowKind::DedupMarker).count(), 5);

    let head = rows.iter().find(|r| r.row_key == "SS-HEAD").unwrap();
    assert_eq!(head.get("Version").and_then(|v| v.as_i64()), Some(5));
}

fn stale_tag_is_a_concurrency_conflict<S: TableStore>(store: &S) {
    let partition = Partition::new("race").unwrap();
    Stream::provision(store, &Stream::new(partition.clone())).unwrap();

    let first = Stream::open(store, &partition).unwrap();
    let second = Stream::open(store, &partition).unwrap();

    Stream::write(store, &first, &[EventData::new(Properties::new().with("Who", "first"))]).unwrap();
    let err = Stream::write(store, &second, &[EventData::new(Properties::new().with("Who", "second"))])
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }), "got {err:?}");

    // The losing batch left nothing behind.
    let slice = Stream::read(store, &partition, 1, 10).unwrap();
    assert_eq!(slice.events.len(), 1);
    assert_eq!(slice.events[0].properties.get("Who").and_then(|v| v.as_str()), Some("first"));
}

fn duplicate_id_in_later_append_is_detected<S: TableStore>(store: &S) {
    let partition = Partition::new("dedup").unwrap();
    let first = Stream::write(
        store,
        &Stream::new(partition.clone()),
        &common::identified_events("e", 2),
    )
    .unwrap();

    let retry = vec![
        EventData::with_id("fresh", Properties::new()),
        EventData::with_id("e-1", Properties::new()),
    ];
    let err = Stream::write(store, &first.stream, &retry).unwrap_err();
    match err {
        Error::DuplicateEvent { id, version, .. } => {
            assert_eq!(id, "e-1");
            // Version the duplicate would have had in this append.
            assert_eq!(version, 4);
        }
        other => panic!("expected DuplicateEvent, got {other:?}"),
    }

    let stream = Stream::open(store, &partition).unwrap();
    assert_eq!(stream.version, 2);
    assert_eq!(Stream::event_version(store, &partition, "fresh").unwrap(), None);
    assert_eq!(Stream::event_version(store, &partition, "e-1").unwrap(), Some(1));
}

fn virtual_partitions_share_one_physical_partition<S: TableStore>(store: &S) {
    let orders = Partition::with_prefix("tenant", "orders").unwrap();
    let invoices = Partition::with_prefix("tenant", "invoices").unwrap();

    Stream::write(store, &Stream::new(orders.clone()), &common::identified_events("o", 3)).unwrap();
    Stream::write(store, &Stream::new(invoices.clone()), &common::identified_events("o", 1)).unwrap();

    assert_eq!(Stream::open(store, &orders).unwrap().version, 3);
    assert_eq!(Stream::open(store, &invoices).unwrap().version, 1);
    assert_eq!(Stream::read(store, &invoices, 1, 10).unwrap().events.len(), 1);

    let rows = common::all_rows(store, "tenant");
    assert_eq!(rows.len(), 7 + 3);
    assert!(rows.iter().all(|r| r.row_key.starts_with("orders|") || r.row_key.starts_with("invoices|")));

    assert!(!Stream::exists(store, &Partition::new("tenant").unwrap()).unwrap());
}

fn head_properties_survive_appends<S: TableStore>(store: &S) {
    let partition = Partition::new("meta").unwrap();
    let created = Stream::write(
        store,
        &Stream::with_properties(partition.clone(), Properties::new().with("Owner", "alice")),
        &common::identified_events("e", 1),
    )
    .unwrap();
    assert_eq!(
        Stream::open(store, &partition).unwrap().properties.get("Owner").and_then(|v| v.as_str()),
        Some("alice")
    );

    let updated = Stream::set_properties(
        store,
        &created.stream,
        Properties::new().with("Region", "eu"),
    )
    .unwrap();
    Stream::write(store, &updated, &common::identified_events("f", 2)).unwrap();

    let opened = Stream::open(store, &partition).unwrap();
    assert_eq!(opened.version, 3);
    assert_eq!(opened.properties.get("Region").and_then(|v| v.as_str()), Some("eu"));
    assert!(opened.properties.get("Owner").is_none());

    // A stale stream object cannot overwrite metadata either.
    let err = Stream::set_properties(store, &created.stream, Properties::new()).unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));
}

fn chained_appends_keep_versions_gap_free<S: TableStore>(store: &S) {
    let partition = Partition::new("chain").unwrap();
    let mut stream = Stream::new(partition.clone());
    for round in 0..4 {
        let result = Stream::write(store, &stream, &common::identified_events(&format!("r{round}"), 3)).unwrap();
        assert_eq!(result.events.first().unwrap().version, round * 3 + 1);
        stream = result.stream;
    }
    assert_eq!(stream.version, 12);

    let mut versions = Vec::new();
    let mut next = 1;
    loop {
        let slice = Stream::read(store, &partition, next, 5).unwrap();
        versions.extend(slice.events.iter().map(|e| e.version));
        if slice.is_end_of_stream {
            break;
        }
        next = versions.last().unwrap() + 1;
    }
    assert_eq!(versions, (1..=12).collect::<Vec<i64>>());
}

fn every_type() -> Properties {
    Properties::new()
        .with("Text", "ünïcode ✓")
        .with("Empty", "")
        .with("Small", i32::MIN)
        .with("Big", i64::MIN)
        .with("Half", 0.5f64)
        .with("Large", -2.25e10f64)
        .with("Flag", true)
        .with("At", Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap())
        .with("NoBytes", Vec::<u8>::new())
        .with("Bytes", vec![0u8, 127, 255])
        .with("Id", Uuid::from_u128(0xfeed_beef))
}

fn every_property_type_round_trips<S: TableStore>(store: &S) {
    let partition = Partition::new("types").unwrap();
    let stream = Stream::provision(store, &Stream::with_properties(partition.clone(), every_type())).unwrap();

    let opened = Stream::open(store, &partition).unwrap();
    assert_eq!(opened.properties, every_type());
    for (name, value) in every_type().iter() {
        assert_eq!(opened.properties.get(name), Some(value), "head property {name}");
    }

    Stream::write(store, &stream, &[EventData::with_id("typed", every_type())]).unwrap();
    let slice = Stream::read(store, &partition, 1, 10).unwrap();
    assert_eq!(slice.events.len(), 1);
    for (name, value) in every_type().iter() {
        assert_eq!(slice.events[0].properties.get(name), Some(value), "event property {name}");
    }
    assert_eq!(slice.events[0].properties, every_type());
}

fn non_finite_doubles_are_refused_before_submission<S: TableStore>(store: &S) {
    let partition = Partition::new("non-finite").unwrap();

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let err = Stream::write(
            store,
            &Stream::new(partition.clone()),
            &[EventData::new(Properties::new().with("Ratio", value))],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "Ratio"));

        let err = Stream::provision(
            store,
            &Stream::with_properties(partition.clone(), Properties::new().with("Inf", value)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "Inf"));
    }

    assert!(!Stream::exists(store, &partition).unwrap());
    assert!(common::all_rows(store, "non-finite").is_empty());
}

#[test]
fn scenarios_on_memory_store() {
    run_all(&MemoryStore::new());
}

#[test]
fn scenarios_on_sqlite_store() {
    let (_dir, _path, store) = common::create_temp_store("scenarios.db");
    run_all(&store);
}

#[test]
fn sqlite_store_survives_reopen() {
    let (_dir, path, store) = common::create_temp_store("reopen.db");
    let partition = Partition::new("durable").unwrap();
    let written = Stream::write(&store, &Stream::new(partition.clone()), &common::identified_events("e", 3)).unwrap();
    drop(store);

    let reopened = SqliteStore::open(&path).unwrap();
    let stream = Stream::open(&reopened, &partition).unwrap();
    assert_eq!(stream, written.stream);

    let slice = Stream::read(&reopened, &partition, 1, 10).unwrap();
    assert_eq!(slice.events.len(), 3);
    assert_eq!(slice.events[2].properties.get("Amount").and_then(|v| v.as_i64()), Some(3));

    let err = Stream::write(&reopened, &stream, &common::identified_events("e", 1)).unwrap_err();
    assert!(matches!(err, Error::DuplicateEvent { .. }));
}

#[test]
fn smaller_batch_ceiling_limits_appends() {
    let store = MemoryStore::with_config(TableConfig::default().with_max_batch_size(7));
    let partition = Partition::new("small").unwrap();

    // 1 head + 3 events + 3 markers fits exactly.
    Stream::write(&store, &Stream::new(partition.clone()), &common::identified_events("a", 3)).unwrap();

    let stream = Stream::open(&store, &partition).unwrap();
    let err = Stream::write(&store, &stream, &common::identified_events("b", 4)).unwrap_err();
    assert!(matches!(err, Error::BatchTooLarge { operations: 9, max: 7 }));
}
