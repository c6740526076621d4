//! End-to-end append/flush/read-back tests over both store backends.

use eyre::Result;
use rowpack::{
    AppendBuffer, Dataset, DatasetOptions, ExtensibleStore, FieldDef, FileStore, MemoryStore,
    PackedLayout, Record, RecordBuilder, RecordSchema, StorageKind, Value,
};
use tempfile::tempdir;

fn event_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("n", StorageKind::Int4),
        FieldDef::new("flag", StorageKind::Bool),
        FieldDef::new("name", StorageKind::Text),
        FieldDef::new("scores", StorageKind::seq(StorageKind::Float8)),
    ])
    .unwrap()
}

fn event(schema: &RecordSchema, n: i32) -> Record {
    let mut builder = RecordBuilder::new(schema);
    builder.set_int4(0, n).unwrap();
    builder.set_bool(1, n % 2 == 0).unwrap();
    builder.set_text(2, &format!("event-{n}")).unwrap();
    builder
        .set(3, (0..(n % 4) as usize).map(|i| i as f64 * 0.5).collect::<Vec<_>>())
        .unwrap();
    builder.finish().unwrap()
}

fn check_events<D: Dataset>(dataset: &D, layout: &PackedLayout, count: i32) {
    assert_eq!(dataset.len(), count as u64);
    for n in 0..count {
        let row = dataset.row(n as u64).unwrap();
        let view = row.view(layout).unwrap();
        assert_eq!(view.get_int4(0).unwrap(), n);
        assert_eq!(view.get_bool(1).unwrap(), n % 2 == 0);
        assert_eq!(view.get_text(2).unwrap(), format!("event-{n}"));

        let scores = view.get_seq(3).unwrap();
        assert_eq!(scores.len(), (n % 4) as usize);
        for i in 0..scores.len() {
            assert_eq!(scores.get_float8(i).unwrap(), i as f64 * 0.5);
        }
    }
}

/// 98 records through a max_size-10 buffer: nine full blocks land during
/// the pushes, the trailing eight on the final flush.
#[test]
fn ninety_eight_records_file_backend() -> Result<()> {
    let dir = tempdir()?;
    let schema = event_schema();
    let mut store = FileStore::open(dir.path())?;
    let mut buffer = AppendBuffer::create(&mut store, "events", schema.clone(), 10)?;

    for n in 0..98 {
        buffer.push_back(event(&schema, n))?;
        assert_eq!(buffer.len(), n as u64 + 1);
    }
    assert_eq!(buffer.flushed_len(), 90);
    assert_eq!(buffer.pending(), 8);

    buffer.flush()?;
    assert_eq!(buffer.flushed_len(), 98);
    assert_eq!(buffer.pending(), 0);

    let layout = buffer.layout().clone();
    let dataset = buffer.into_dataset().map_err(|(_, err)| err)?;
    check_events(&dataset, &layout, 98);
    Ok(())
}

#[test]
fn ninety_eight_records_memory_backend() -> Result<()> {
    let schema = event_schema();
    let mut store = MemoryStore::new();
    let mut buffer = AppendBuffer::create(&mut store, "events", schema.clone(), 10)?;

    for n in 0..98 {
        buffer.push_back(event(&schema, n))?;
    }
    buffer.flush()?;

    let layout = buffer.layout().clone();
    let dataset = buffer.into_dataset().map_err(|(_, err)| err)?;
    check_events(&dataset, &layout, 98);
    Ok(())
}

#[test]
fn nested_sequences_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let schema = RecordSchema::new(vec![
        FieldDef::new("id", StorageKind::Int8),
        FieldDef::new("matrix", StorageKind::seq(StorageKind::seq(StorageKind::Int4))),
        FieldDef::new("labels", StorageKind::seq(StorageKind::Text)),
    ])?;

    let mut store = FileStore::open(dir.path())?;
    let mut buffer = AppendBuffer::create(&mut store, "nested", schema.clone(), 4)?;

    let record = Record::from_values(
        &schema,
        vec![
            Value::Int8(42),
            Value::from(vec![vec![1i32, 2, 3], Vec::<i32>::new(), vec![7i32]]),
            Value::from(vec!["alpha", "", "gämma"]),
        ],
    )?;
    buffer.push_back(record)?;
    buffer.flush()?;

    let row = buffer.row(0)?;
    let view = row.view(buffer.layout())?;
    assert_eq!(view.get_int8(0)?, 42);

    let matrix = view.get_seq(1)?;
    assert_eq!(matrix.len(), 3);
    let first = matrix.get_seq(0)?;
    assert_eq!(first.len(), 3);
    assert_eq!(first.get_int4(2)?, 3);
    assert!(matrix.get_seq(1)?.is_empty());
    assert_eq!(matrix.get_seq(2)?.get_int4(0)?, 7);

    let labels = view.get_seq(2)?;
    assert_eq!(labels.get_text(0)?, "alpha");
    assert_eq!(labels.get_text(1)?, "");
    assert_eq!(labels.get_text(2)?, "gämma");
    Ok(())
}

/// Records built from temporaries stay valid: the buffer owns the record
/// until flush, and encoding reads the owned data at flush time.
#[test]
fn records_built_from_temporaries_survive_until_flush() -> Result<()> {
    let schema = RecordSchema::new(vec![
        FieldDef::new("name", StorageKind::Text),
        FieldDef::new("xs", StorageKind::seq(StorageKind::Int4)),
    ])?;
    let mut store = MemoryStore::new();
    let mut buffer = AppendBuffer::create(&mut store, "tmp", schema.clone(), 100)?;

    for n in 0..20 {
        // Both values are built, moved, and dropped inside this iteration.
        let name = format!("temp-{n}");
        let xs: Vec<i32> = (0..n).collect();
        let record = Record::from_values(&schema, vec![Value::from(name), Value::from(xs)])?;
        buffer.push_back(record)?;
    }
    buffer.flush()?;

    for n in 0..20i32 {
        let row = buffer.row(n as u64)?;
        let view = row.view(buffer.layout())?;
        assert_eq!(view.get_text(0)?, format!("temp-{n}"));
        let xs = view.get_seq(1)?;
        assert_eq!(xs.len(), n as usize);
        for i in 0..xs.len() {
            assert_eq!(xs.get_int4(i)?, i as i32);
        }
    }
    Ok(())
}

#[test]
fn reopen_and_resume_appending() -> Result<()> {
    let dir = tempdir()?;
    let schema = event_schema();
    let layout;

    {
        let mut store = FileStore::open(dir.path())?;
        let mut buffer = AppendBuffer::create(&mut store, "events", schema.clone(), 10)?;
        for n in 0..15 {
            buffer.push_back(event(&schema, n))?;
        }
        layout = buffer.layout().clone();
        buffer.into_dataset().map_err(|(_, err)| err)?;
    }

    let store = FileStore::open(dir.path())?;
    let dataset = store.open_dataset("events", &layout)?;
    assert_eq!(dataset.len(), 15);

    let mut buffer = AppendBuffer::resume(dataset, schema.clone(), 10)?;
    assert_eq!(buffer.len(), 15);
    for n in 15..30 {
        buffer.push_back(event(&schema, n))?;
    }
    buffer.sync()?;

    let dataset = buffer.into_dataset().map_err(|(_, err)| err)?;
    check_events(&dataset, &layout, 30);
    Ok(())
}

#[test]
fn configuration_errors_reported_up_front() {
    let schema = event_schema();
    let mut store = MemoryStore::new();

    let err = AppendBuffer::<rowpack::MemoryDataset>::create(&mut store, "x", schema.clone(), 0)
        .unwrap_err();
    assert!(err.to_string().contains("max_size"));

    AppendBuffer::create(&mut store, "events", schema.clone(), 10).unwrap();
    let err = AppendBuffer::<rowpack::MemoryDataset>::create(&mut store, "events", schema, 10)
        .unwrap_err();
    assert!(err.to_string().contains("already bound"));
}

#[test]
fn scalar_only_schema_has_no_heap() -> Result<()> {
    let dir = tempdir()?;
    let schema = RecordSchema::new(vec![
        FieldDef::new("a", StorageKind::Int2),
        FieldDef::new("b", StorageKind::Float4),
    ])?;

    let mut store = FileStore::open(dir.path())?;
    let mut buffer = AppendBuffer::create(&mut store, "plain", schema.clone(), 5)?;

    let record = Record::from_values(&schema, vec![Value::Int2(-3), Value::Float4(2.5)])?;
    buffer.push_back(record)?;
    buffer.sync()?;

    let row = buffer.row(0)?;
    let view = row.view(buffer.layout())?;
    assert_eq!(view.get_int2(0)?, -3);
    assert_eq!(view.get_float4(1)?, 2.5);
    assert!(!dir.path().join("plain.heap").exists());
    Ok(())
}

/// The packed layout drops the alignment padding the in-memory record
/// representation would carry.
#[test]
fn packed_layout_removes_padding() -> Result<()> {
    let schema = RecordSchema::new(vec![
        FieldDef::new("flag", StorageKind::Bool),
        FieldDef::new("weight", StorageKind::Float8),
    ])?;
    let layout = PackedLayout::for_schema(&schema)?;

    assert_eq!(layout.record_size(), 9);
    assert_eq!(layout.padding_removed(), 7);

    let mut store = MemoryStore::new();
    let mut buffer = AppendBuffer::create(&mut store, "padded", schema.clone(), 2)?;
    let record = Record::from_values(&schema, vec![Value::Bool(true), Value::Float8(1.25)])?;
    buffer.push_back(record)?;
    buffer.flush()?;

    let row = buffer.row(0)?;
    assert_eq!(row.fixed.len(), 9);
    Ok(())
}

/// Datasets created behind the buffer's back still honor the extend
/// contract the buffer relies on.
#[test]
fn direct_dataset_use_enforces_extent() -> Result<()> {
    let schema = RecordSchema::new(vec![FieldDef::new("x", StorageKind::Int4)])?;
    let layout = PackedLayout::for_schema(&schema)?;
    let mut store = MemoryStore::new();
    let mut dataset = store.create_dataset("raw", &layout, DatasetOptions::default())?;

    let record = Record::from_values(&schema, vec![Value::Int4(9)])?;
    let payload = rowpack::encode_record(&record, &layout)?;

    assert!(dataset.write_range(0, &[payload.clone()]).is_err());
    dataset.extend(1)?;
    dataset.write_range(0, &[payload])?;
    assert!(dataset.extend(0).is_err());
    assert_eq!(dataset.len(), 1);
    Ok(())
}
