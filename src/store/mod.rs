//! # Extensible Store
//!
//! The storage collaborator the append buffer writes through. A store
//! creates named, append-only, resizable datasets; a dataset supports the
//! minimal extend/write/read protocol:
//!
//! ```text
//! create_dataset(name, layout, options) -> Dataset
//! extend(new_len)            grow the logical length (monotone)
//! write_range(start, rows)   fill [start, start + rows.len())
//! len()                      committed logical length
//! row(idx)                   borrowed read-back of one committed row
//! sync()                     durability barrier
//! ```
//!
//! `write_range` requires the target range to be covered by a prior
//! `extend`; the append buffer always extends and writes in one flush, so
//! a failure between the two is surfaced as a torn commit.
//!
//! Two backends ship with the crate:
//!
//! - [`memory::MemoryStore`]: rows in `Vec`s, for tests and staging
//! - [`file::FileStore`]: mmap-backed files with chunk-aligned growth
//!
//! Exactly one dataset handle exists per name; creating the same name
//! twice is a configuration error. The handle is owned by its buffer and
//! is single-writer by construction.

pub mod file;
mod mapped;
pub mod memory;

pub use file::{FileDataset, FileStore};
pub use memory::{MemoryDataset, MemoryStore};

use eyre::Result;

use crate::records::{PackedLayout, RowPayload, RowRef};

/// Dataset creation parameters.
///
/// `chunk_rows` is the store's internal block size in rows; the append
/// buffer sets it to its own `max_size` so one flush maps to one block.
#[derive(Debug, Clone, Copy)]
pub struct DatasetOptions {
    pub chunk_rows: usize,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self { chunk_rows: 10 }
    }
}

/// An append-only, resizable, named range of records.
pub trait Dataset {
    /// Grows the logical length to `new_len` records. Shrinking is an
    /// error; re-extending to the current length is a no-op, which makes
    /// a retried flush after a torn commit idempotent up to the write.
    fn extend(&mut self, new_len: u64) -> Result<()>;

    /// Writes `rows` into `[start, start + rows.len())`. The range must
    /// already be covered by a prior `extend`.
    fn write_range(&mut self, start: u64, rows: &[RowPayload]) -> Result<()>;

    /// Committed logical length in records.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrowed access to one committed row.
    ///
    /// Rows inside the extended length that were never written are
    /// backend-defined: the memory backend reports an error, the file
    /// backend returns zeroed bytes (scalars decode as zero, variable
    /// fields as empty). The append buffer never exposes such rows; it
    /// extends and writes in the same flush.
    fn row(&self, idx: u64) -> Result<RowRef<'_>>;

    /// Flushes pending writes to durable storage (no-op in memory).
    fn sync(&self) -> Result<()>;
}

/// Factory for datasets, keyed by name.
pub trait ExtensibleStore {
    type Dataset: Dataset;

    /// Creates an initially empty dataset under `name`. Binding the same
    /// name twice is a configuration error.
    fn create_dataset(
        &mut self,
        name: &str,
        layout: &PackedLayout,
        options: DatasetOptions,
    ) -> Result<Self::Dataset>;
}
