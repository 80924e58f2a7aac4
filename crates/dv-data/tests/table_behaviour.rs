//! End-to-end behaviour of tables, views and queues

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use dv_core::{listener_from_fn, ChangeEvent, FieldType, Id, Record, Topic, Value};
use dv_data::{
    DataError, DataInput, DataSet, DataSetOptions, DataSource, DataView, DataViewOptions, Query,
    QueueOptions,
};
use parking_lot::Mutex;
use serde_json::json;

fn input(json: serde_json::Value) -> DataInput {
    DataInput::try_from(json).expect("valid input")
}

fn record_events(source: &dyn DataSource) -> Arc<Mutex<Vec<ChangeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    source.on(Topic::All, listener_from_fn(move |e| sink.lock().push(e.clone())));
    events
}

fn dated() -> DataSetOptions {
    DataSetOptions::default().with_type("start", FieldType::Date)
}

#[test]
fn test_date_field_accepts_every_representation() -> anyhow::Result<()> {
    let expected = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
    let set = DataSet::new(dated());

    let inputs = vec![
        json!({"start": expected.timestamp_millis()}),
        json!({"start": "2021-03-04T05:06:07Z"}),
        json!({"start": "2021-03-04T06:06:07+01:00"}),
        json!({"start": format!("/Date({})/", expected.timestamp_millis())}),
    ];
    for json in inputs {
        let ids = set.add(input(json), None)?;
        let stored = set.get(&ids[0]).expect("stored record");
        assert_eq!(stored["start"], Value::Date(expected));
    }

    let mut date_record = Record::new();
    date_record.insert("start".into(), Value::Date(expected));
    let ids = set.add(date_record, None)?;
    assert_eq!(set.get(&ids[0]).unwrap()["start"].as_date(), Some(expected));
    Ok(())
}

#[test]
fn test_remove_then_get_is_none_and_event_fires_once() -> anyhow::Result<()> {
    let set = DataSet::with_data(input(json!([{"id": "a"}, {"id": "b"}])), DataSetOptions::default())?;
    let events = record_events(&set);

    set.remove(["a", "a"], None)?;

    assert!(set.get(&Id::from("a")).is_none());
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, Topic::Remove);
    assert_eq!(events[0].items, vec![Id::from("a")]);
    Ok(())
}

#[test]
fn test_duplicate_add_leaves_count_unchanged() -> anyhow::Result<()> {
    let set = DataSet::with_data(input(json!([{"id": 1}, {"id": 2}])), DataSetOptions::default())?;

    let err = set.add(input(json!([{"id": 3}, {"id": 1}])), None).unwrap_err();

    assert_eq!(err, DataError::DuplicateId(Id::Int(1)));
    assert_eq!(set.len(), 2);
    assert!(set.get(&Id::Int(3)).is_none());
    Ok(())
}

#[test]
fn test_update_is_a_partial_merge() -> anyhow::Result<()> {
    let set = DataSet::with_data(
        input(json!({"id": 1, "x": 1, "label": "keep", "start": "2020-01-01"})),
        dated(),
    )?;
    let before = set.get(&Id::Int(1)).unwrap();

    set.update(input(json!({"id": 1, "x": 5})), None)?;

    let after = set.get(&Id::Int(1)).unwrap();
    assert_eq!(after["x"], Value::Number(5.0));
    for field in ["id", "label", "start"] {
        assert_eq!(after[field], before[field], "field {}", field);
    }
    Ok(())
}

#[test]
fn test_view_composes_with_caller_filter_and_order() -> anyhow::Result<()> {
    let set = DataSet::with_data(
        input(json!([
            {"id": 1, "n": 5, "group": "a"},
            {"id": 2, "n": 3, "group": "b"},
            {"id": 3, "n": 8, "group": "a"},
            {"id": 4, "n": 1, "group": "a"}
        ])),
        DataSetOptions::default(),
    )?;
    let view = DataView::new(
        Arc::new(set.clone()),
        DataViewOptions::new().with_filter(|r| r["group"] == Value::from("a")),
    )?;

    let query = Query::new()
        .filter(|r| r["n"].as_f64().unwrap_or(0.0) > 2.0)
        .order_by("n");
    let from_view = view.query(&query)?;
    let from_table: Vec<Record> = set
        .query(&query)?
        .into_iter()
        .filter(|r| r["group"] == Value::from("a"))
        .collect();

    assert_eq!(from_view, from_table);
    assert_eq!(from_view.len(), 2);
    assert_eq!(from_view[0]["id"], Value::Number(1.0));
    Ok(())
}

#[test]
fn test_nested_views_resolve_to_root_table() -> anyhow::Result<()> {
    let set = DataSet::with_data(input(json!([{"id": 1, "n": 1}, {"id": 2, "n": 2}])), DataSetOptions::default())?;
    let outer = DataView::new(Arc::new(set.clone()), DataViewOptions::new().with_filter(|r| r["n"].as_f64() > Some(0.0)))?;
    let inner = DataView::new(Arc::new(outer.clone()), DataViewOptions::new().with_filter(|r| r["n"].as_f64() > Some(1.0)))?;
    let events = record_events(&inner);

    assert_eq!(inner.get_ids(&Query::new())?, vec![Id::Int(2)]);
    assert_eq!(inner.get_data_set().len(), set.len());

    set.add(input(json!([{"id": 3, "n": 3}, {"id": 4, "n": 0}])), Some("origin"))?;

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].items, vec![Id::Int(3)]);
    assert_eq!(events[0].sender_id.as_deref(), Some("origin"));
    Ok(())
}

#[test]
fn test_for_each_and_map_receive_ids() -> anyhow::Result<()> {
    let set = DataSet::with_data(input(json!([{"id": 2, "v": "b"}, {"id": 1, "v": "a"}])), DataSetOptions::default())?;

    let mut seen = Vec::new();
    set.for_each(&Query::new().order_by("v"), |record, id| {
        seen.push((id.clone(), record["v"].clone()));
    })?;
    assert_eq!(seen, vec![(Id::Int(1), Value::from("a")), (Id::Int(2), Value::from("b"))]);

    let labels = set.map(&Query::new(), |record, id| format!("{}={}", id, record["v"]))?;
    assert_eq!(labels, vec!["2=b", "1=a"]);

    let keyed = set.query_map(&Query::new().fields(["v"]))?;
    assert_eq!(keyed[&Id::Int(1)].len(), 1);
    Ok(())
}

#[test]
fn test_queued_adds_flush_as_separate_events() -> anyhow::Result<()> {
    let set = DataSet::new(DataSetOptions::default().with_queue(QueueOptions::new()));
    let events = record_events(&set);

    for id in 1..=3 {
        let ids = set.add(input(json!({"id": id})), None)?;
        assert!(ids.is_empty(), "queued calls return no ids");
    }
    assert_eq!(set.queued(), 3);
    assert!(events.lock().is_empty());

    set.flush()?;

    let events = events.lock();
    assert_eq!(events.len(), 3);
    for (event, id) in events.iter().zip(1..=3) {
        assert_eq!(event.topic, Topic::Add);
        assert_eq!(event.items, vec![Id::Int(id)]);
    }
    Ok(())
}

#[test]
fn test_queue_flush_reports_failures_after_running_everything() -> anyhow::Result<()> {
    let set = DataSet::new(DataSetOptions::default().with_queue(QueueOptions::new()));

    set.add(input(json!({"id": 1})), None)?;
    set.add(input(json!({"id": 1})), None)?;
    set.add(input(json!({"id": 2})), None)?;

    match set.flush() {
        Err(DataError::QueueFlush(errors)) => {
            assert_eq!(errors, vec![DataError::DuplicateId(Id::Int(1))]);
        }
        other => panic!("expected aggregated flush error, got {:?}", other),
    }
    assert_eq!(set.len(), 2);
    Ok(())
}

#[test]
fn test_removing_queue_flushes_and_restores_direct_calls() -> anyhow::Result<()> {
    let set = DataSet::new(DataSetOptions::default().with_queue(QueueOptions::new()));
    set.add(input(json!({"id": 1})), None)?;

    set.set_queue(None)?;
    assert_eq!(set.len(), 1);

    let ids = set.add(input(json!({"id": 2})), None)?;
    assert_eq!(ids, vec![Id::Int(2)]);
    Ok(())
}

#[test]
fn test_min_and_distinct_on_dates() -> anyhow::Result<()> {
    let set = DataSet::with_data(
        input(json!([{"id": 1, "start": "2020-01-01"}, {"id": 2, "start": "2020-06-01"}])),
        dated(),
    )?;

    assert_eq!(set.min("start").unwrap()["id"], Value::Number(1.0));
    assert_eq!(set.max("start").unwrap()["id"], Value::Number(2.0));
    assert_eq!(set.distinct("start")?.len(), 2);
    Ok(())
}

#[test]
fn test_per_call_type_override() -> anyhow::Result<()> {
    let set = DataSet::with_data(input(json!([{"id": 1, "start": "2020-01-01"}])), dated())?;
    let mut types = dv_core::FieldTypes::new();
    types.insert("start".into(), FieldType::IsoDate);

    let records = set.query(&Query::new().types(types))?;
    assert_eq!(records[0]["start"], Value::from("2020-01-01T00:00:00.000Z"));
    Ok(())
}

#[test]
fn test_get_with_applies_filter_and_projection() -> anyhow::Result<()> {
    let set = DataSet::with_data(input(json!([{"id": 1, "a": 1, "b": 2}])), DataSetOptions::default())?;

    let projected = set.get_with(&Id::Int(1), &Query::new().fields(["b"]))?.unwrap();
    assert_eq!(projected.keys().collect::<Vec<_>>(), vec!["b"]);

    let hidden = set.get_with(&Id::Int(1), &Query::new().filter(|r| r.contains_key("zzz")))?;
    assert!(hidden.is_none());
    assert!(set.get_with(&Id::Int(9), &Query::new())?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_debounced_queue_applies_after_delay() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let set = DataSet::new(DataSetOptions::default().with_queue(QueueOptions::new().with_delay(20)));
    let events = record_events(&set);

    set.add(input(json!({"id": 1})), None)?;
    set.add(input(json!({"id": 1})), None)?;
    set.add(input(json!({"id": 2})), None)?;
    assert!(set.is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // the duplicate fails inside the timer and is only logged
    assert_eq!(set.len(), 2);
    assert_eq!(events.lock().len(), 2);
    assert_eq!(set.queued(), 0);
    Ok(())
}
