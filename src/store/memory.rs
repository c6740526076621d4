//! # In-Memory Store Backend
//!
//! Rows live in plain `Vec`s. Useful for tests, staging pipelines, and
//! any caller that wants append-buffer semantics without a filesystem.
//! The store itself only tracks which names are bound; the dataset handle
//! owns the data, matching the single-writer discipline of the file
//! backend.

use eyre::{bail, ensure, Result};
use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::records::{PackedLayout, RowPayload, RowRef};
use crate::store::{Dataset, DatasetOptions, ExtensibleStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    bound: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtensibleStore for MemoryStore {
    type Dataset = MemoryDataset;

    fn create_dataset(
        &mut self,
        name: &str,
        layout: &PackedLayout,
        _options: DatasetOptions,
    ) -> Result<Self::Dataset> {
        ensure!(
            self.bound.insert(name.to_string()),
            "dataset '{}' is already bound",
            name
        );
        Ok(MemoryDataset {
            record_size: layout.record_size(),
            var_fields: layout.var_field_count(),
            rows: Vec::new(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryDataset {
    record_size: usize,
    var_fields: usize,
    // None = extended but not yet written.
    rows: Vec<Option<RowPayload>>,
}

impl Dataset for MemoryDataset {
    fn extend(&mut self, new_len: u64) -> Result<()> {
        let current = self.rows.len() as u64;
        ensure!(
            new_len >= current,
            "cannot shrink dataset from {} to {} rows",
            current,
            new_len
        );
        self.rows.resize_with(new_len as usize, || None);
        Ok(())
    }

    fn write_range(&mut self, start: u64, rows: &[RowPayload]) -> Result<()> {
        let end = start + rows.len() as u64;
        ensure!(
            end <= self.rows.len() as u64,
            "write range {}..{} exceeds extended length {}",
            start,
            end,
            self.rows.len()
        );
        for (i, row) in rows.iter().enumerate() {
            ensure!(
                row.fixed.len() == self.record_size,
                "row {} fixed region is {} bytes, dataset expects {}",
                start + i as u64,
                row.fixed.len(),
                self.record_size
            );
            ensure!(
                row.vars.len() == self.var_fields,
                "row {} has {} var payloads, dataset expects {}",
                start + i as u64,
                row.vars.len(),
                self.var_fields
            );
            self.rows[start as usize + i] = Some(row.clone());
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.rows.len() as u64
    }

    fn row(&self, idx: u64) -> Result<RowRef<'_>> {
        match self.rows.get(idx as usize) {
            Some(Some(row)) => Ok(RowRef {
                fixed: &row.fixed,
                vars: row.vars.iter().map(|v| v.as_slice()).collect::<SmallVec<_>>(),
            }),
            Some(None) => bail!("row {} was extended but never written", idx),
            None => bail!("row {} out of bounds (len={})", idx, self.rows.len()),
        }
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FieldDef, RecordSchema};
    use crate::types::StorageKind;

    fn layout() -> PackedLayout {
        let schema = RecordSchema::new(vec![
            FieldDef::new("id", StorageKind::Int4),
            FieldDef::new("name", StorageKind::Text),
        ])
        .unwrap();
        PackedLayout::for_schema(&schema).unwrap()
    }

    fn payload(id: i32, name: &str, layout: &PackedLayout) -> RowPayload {
        let mut fixed = vec![0u8; layout.record_size()];
        fixed[0..4].copy_from_slice(&id.to_le_bytes());
        RowPayload {
            fixed,
            vars: vec![name.as_bytes().to_vec()],
        }
    }

    #[test]
    fn duplicate_name_rejected() {
        let layout = layout();
        let mut store = MemoryStore::new();
        store
            .create_dataset("events", &layout, DatasetOptions::default())
            .unwrap();
        let err = store
            .create_dataset("events", &layout, DatasetOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("already bound"));

        store
            .create_dataset("other", &layout, DatasetOptions::default())
            .unwrap();
    }

    #[test]
    fn extend_then_write_then_read() {
        let layout = layout();
        let mut store = MemoryStore::new();
        let mut ds = store
            .create_dataset("events", &layout, DatasetOptions::default())
            .unwrap();

        ds.extend(2).unwrap();
        ds.write_range(0, &[payload(1, "a", &layout), payload(2, "bc", &layout)])
            .unwrap();

        assert_eq!(ds.len(), 2);
        let row = ds.row(1).unwrap();
        assert_eq!(&row.fixed[0..4], &2i32.to_le_bytes());
        assert_eq!(row.vars[0], b"bc");
    }

    #[test]
    fn write_outside_extent_rejected() {
        let layout = layout();
        let mut store = MemoryStore::new();
        let mut ds = store
            .create_dataset("events", &layout, DatasetOptions::default())
            .unwrap();

        ds.extend(1).unwrap();
        let err = ds
            .write_range(1, &[payload(1, "a", &layout)])
            .unwrap_err();
        assert!(err.to_string().contains("exceeds extended length"));
    }

    #[test]
    fn shrink_rejected_and_reextend_idempotent() {
        let layout = layout();
        let mut store = MemoryStore::new();
        let mut ds = store
            .create_dataset("events", &layout, DatasetOptions::default())
            .unwrap();

        ds.extend(3).unwrap();
        ds.extend(3).unwrap();
        assert!(ds.extend(2).is_err());
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn unwritten_row_read_rejected() {
        let layout = layout();
        let mut store = MemoryStore::new();
        let mut ds = store
            .create_dataset("events", &layout, DatasetOptions::default())
            .unwrap();

        ds.extend(1).unwrap();
        assert!(ds.row(0).is_err());
        assert!(ds.row(5).is_err());
    }
}
