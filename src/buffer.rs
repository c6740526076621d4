//! # Append Buffer
//!
//! The write path of the crate: records accumulate in an in-memory batch
//! and are committed to the dataset in blocks.
//!
//! ```text
//! push_back(record) ──> [ batch: 0..max_size records ]
//!                                │ batch full, or flush()
//!                                v
//!                  extend(cursor + batch.len())
//!                  write_range(cursor, encoded batch)
//!                  cursor += batch.len(); batch.clear()
//! ```
//!
//! ## Ordering
//!
//! A full buffer flushes *before* accepting the incoming record, so the
//! store only ever sees blocks of at most `max_size` records and the
//! incoming record starts the next batch. `len()` always reports
//! committed plus pending, so growth is continuous from the caller's
//! point of view even though commits are chunked.
//!
//! ## Failure
//!
//! Encoding happens before the dataset is touched, so an encoding error
//! leaves the dataset untouched. If `extend` succeeds but `write_range`
//! fails, the dataset length has grown without the rows landing; the
//! error is surfaced as a torn commit and the batch is kept intact, so a
//! retried `flush()` re-extends (a no-op) and rewrites the same range.
//!
//! Records are validated against the schema at `push_back`, which keeps
//! `flush()` failures to genuine storage faults.

use eyre::{ensure, Report, Result, WrapErr};

use crate::records::{encode_record, PackedLayout, Record, RecordSchema, RowRef};
use crate::store::{Dataset, DatasetOptions, ExtensibleStore};

/// Default batch capacity, in records.
pub const DEFAULT_MAX_SIZE: usize = 10;

#[derive(Debug)]
pub struct AppendBuffer<D: Dataset> {
    schema: RecordSchema,
    layout: PackedLayout,
    max_size: usize,
    batch: Vec<Record>,
    // Committed length of the dataset; rows below this are flushed.
    cursor: u64,
    dataset: D,
}

impl<D: Dataset> AppendBuffer<D> {
    /// Creates a buffer over a freshly bound dataset.
    ///
    /// The dataset's chunk size is set to `max_size` so that one flush
    /// maps to one storage block.
    pub fn create<S>(
        store: &mut S,
        name: &str,
        schema: RecordSchema,
        max_size: usize,
    ) -> Result<Self>
    where
        S: ExtensibleStore<Dataset = D>,
    {
        ensure!(max_size > 0, "buffer max_size must be at least 1");
        let layout = PackedLayout::for_schema(&schema)?;
        let dataset = store.create_dataset(name, &layout, DatasetOptions { chunk_rows: max_size })?;
        ensure!(
            dataset.is_empty(),
            "dataset '{}' was created non-empty",
            name
        );
        Ok(Self {
            schema,
            layout,
            max_size,
            batch: Vec::with_capacity(max_size),
            cursor: 0,
            dataset,
        })
    }

    /// Resumes appending to an existing dataset. The cursor picks up at
    /// the dataset's committed length.
    pub fn resume(dataset: D, schema: RecordSchema, max_size: usize) -> Result<Self> {
        ensure!(max_size > 0, "buffer max_size must be at least 1");
        let layout = PackedLayout::for_schema(&schema)?;
        let cursor = dataset.len();
        Ok(Self {
            schema,
            layout,
            max_size,
            batch: Vec::with_capacity(max_size),
            cursor,
            dataset,
        })
    }

    /// Appends one record, flushing first if the batch is full.
    pub fn push_back(&mut self, record: Record) -> Result<()> {
        self.schema.check_record(&record)?;
        if self.batch.len() == self.max_size {
            self.flush()?;
        }
        self.batch.push(record);
        Ok(())
    }

    /// Commits the pending batch to the dataset. No-op when empty.
    ///
    /// On failure the batch is left intact so the caller can retry.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let mut payloads = Vec::with_capacity(self.batch.len());
        for record in &self.batch {
            payloads.push(encode_record(record, &self.layout)?);
        }

        let new_len = self.cursor + payloads.len() as u64;
        self.dataset
            .extend(new_len)
            .wrap_err("failed to extend dataset for flush")?;
        self.dataset
            .write_range(self.cursor, &payloads)
            .wrap_err_with(|| {
                format!(
                    "torn commit: dataset extended to {} but rows {}..{} were not written",
                    new_len, self.cursor, new_len
                )
            })?;

        self.cursor = new_len;
        self.batch.clear();
        Ok(())
    }

    /// Total records appended so far: committed plus pending.
    pub fn len(&self) -> u64 {
        self.cursor + self.batch.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records waiting in the batch, not yet committed.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Committed dataset length, excluding the pending batch.
    pub fn flushed_len(&self) -> u64 {
        self.cursor
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn layout(&self) -> &PackedLayout {
        &self.layout
    }

    /// Borrowed read-back of a committed row. Pending records are not
    /// visible; call [`flush`](Self::flush) first.
    pub fn row(&self, idx: u64) -> Result<RowRef<'_>> {
        self.dataset.row(idx)
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut D {
        &mut self.dataset
    }

    /// Flushes, syncs, and releases the underlying dataset.
    ///
    /// On failure the buffer is handed back alongside the error with its
    /// pending batch intact, so the tail can still be retried.
    pub fn into_dataset(mut self) -> Result<D, (Self, Report)> {
        if let Err(err) = self.flush() {
            return Err((self, err));
        }
        if let Err(err) = self.dataset.sync() {
            return Err((self, err));
        }
        Ok(self.dataset)
    }

    /// Flushes the batch and pushes a durability barrier to the store.
    pub fn sync(&mut self) -> Result<()> {
        self.flush()?;
        self.dataset.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FieldDef, RowPayload};
    use crate::types::{StorageKind, Value};
    use eyre::bail;

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![FieldDef::new("id", StorageKind::Int4)]).unwrap()
    }

    fn record(schema: &RecordSchema, id: i32) -> Record {
        Record::from_values(schema, vec![Value::Int4(id)]).unwrap()
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Extend(u64),
        Write { start: u64, count: usize },
    }

    /// Scripted dataset that records the call sequence and can fail a
    /// configured number of writes.
    #[derive(Debug, Default)]
    struct ScriptedDataset {
        len: u64,
        ops: Vec<Op>,
        rows: Vec<RowPayload>,
        fail_writes: usize,
    }

    impl Dataset for ScriptedDataset {
        fn extend(&mut self, new_len: u64) -> Result<()> {
            ensure!(new_len >= self.len, "shrink");
            self.ops.push(Op::Extend(new_len));
            self.len = new_len;
            Ok(())
        }

        fn write_range(&mut self, start: u64, rows: &[RowPayload]) -> Result<()> {
            self.ops.push(Op::Write {
                start,
                count: rows.len(),
            });
            if self.fail_writes > 0 {
                self.fail_writes -= 1;
                bail!("injected write failure");
            }
            ensure!(start + rows.len() as u64 <= self.len, "out of extent");
            ensure!(start as usize == self.rows.len(), "non-contiguous write");
            self.rows.extend_from_slice(rows);
            Ok(())
        }

        fn len(&self) -> u64 {
            self.len
        }

        fn row(&self, _idx: u64) -> Result<RowRef<'_>> {
            bail!("not supported by the scripted dataset")
        }

        fn sync(&self) -> Result<()> {
            Ok(())
        }
    }

    fn buffer(max_size: usize) -> AppendBuffer<ScriptedDataset> {
        AppendBuffer::resume(ScriptedDataset::default(), schema(), max_size).unwrap()
    }

    #[test]
    fn flushes_before_accepting_overflow_record() {
        let schema = schema();
        let mut buf = buffer(2);

        buf.push_back(record(&schema, 1)).unwrap();
        buf.push_back(record(&schema, 2)).unwrap();
        assert!(buf.dataset().ops.is_empty());

        // Third push flushes the full batch first, then holds record 3.
        buf.push_back(record(&schema, 3)).unwrap();
        assert_eq!(
            buf.dataset().ops,
            vec![Op::Extend(2), Op::Write { start: 0, count: 2 }]
        );
        assert_eq!(buf.pending(), 1);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn len_counts_committed_plus_pending() {
        let schema = schema();
        let mut buf = buffer(10);

        for id in 0..98 {
            buf.push_back(record(&schema, id)).unwrap();
            assert_eq!(buf.len(), id as u64 + 1);
        }
        assert_eq!(buf.flushed_len(), 90);
        assert_eq!(buf.pending(), 8);

        buf.flush().unwrap();
        assert_eq!(buf.flushed_len(), 98);
        assert_eq!(buf.len(), 98);
        assert_eq!(buf.dataset().rows.len(), 98);
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let mut buf = buffer(4);
        buf.flush().unwrap();
        buf.flush().unwrap();
        assert!(buf.dataset().ops.is_empty());
    }

    #[test]
    fn failed_flush_keeps_batch_for_retry() {
        let schema = schema();
        let mut buf = buffer(4);
        buf.dataset.fail_writes = 1;

        buf.push_back(record(&schema, 1)).unwrap();
        buf.push_back(record(&schema, 2)).unwrap();

        let err = buf.flush().unwrap_err();
        assert!(err.to_string().contains("torn commit"));
        assert_eq!(buf.pending(), 2);
        assert_eq!(buf.flushed_len(), 0);

        // Retry: extend(2) again (idempotent), then the write lands.
        buf.flush().unwrap();
        assert_eq!(buf.pending(), 0);
        assert_eq!(buf.flushed_len(), 2);
        assert_eq!(
            buf.dataset().ops,
            vec![
                Op::Extend(2),
                Op::Write { start: 0, count: 2 },
                Op::Extend(2),
                Op::Write { start: 0, count: 2 },
            ]
        );
    }

    #[test]
    fn into_dataset_hands_buffer_back_on_failure() {
        let schema = schema();
        let mut buf = buffer(4);
        buf.dataset.fail_writes = 1;

        buf.push_back(record(&schema, 1)).unwrap();
        buf.push_back(record(&schema, 2)).unwrap();

        let (buf, err) = buf.into_dataset().unwrap_err();
        assert!(err.to_string().contains("torn commit"));
        assert_eq!(buf.pending(), 2);
        assert_eq!(buf.flushed_len(), 0);

        // The fault is gone; the handed-back buffer still owns the tail.
        let dataset = buf.into_dataset().unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows.len(), 2);
    }

    #[test]
    fn mismatched_record_rejected_at_push() {
        let schema = schema();
        let mut buf = buffer(4);

        let wrong = Record::from_values(
            &RecordSchema::new(vec![FieldDef::new("id", StorageKind::Int8)]).unwrap(),
            vec![Value::Int8(1)],
        )
        .unwrap();
        assert!(buf.push_back(wrong).is_err());
        assert_eq!(buf.len(), 0);

        buf.push_back(record(&schema, 1)).unwrap();
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn zero_max_size_rejected() {
        assert!(AppendBuffer::resume(ScriptedDataset::default(), schema(), 0).is_err());
    }

    #[test]
    fn resume_continues_from_committed_length() {
        let schema = schema();
        let mut ds = ScriptedDataset::default();
        ds.len = 5;
        // Pretend five rows are already committed.
        for _ in 0..5 {
            ds.rows.push(RowPayload {
                fixed: vec![0; 4],
                vars: Vec::new(),
            });
        }

        let mut buf = AppendBuffer::resume(ds, schema.clone(), 3).unwrap();
        assert_eq!(buf.len(), 5);

        buf.push_back(record(&schema, 6)).unwrap();
        buf.flush().unwrap();
        assert_eq!(
            buf.dataset().ops,
            vec![Op::Extend(6), Op::Write { start: 5, count: 1 }]
        );
    }
}
