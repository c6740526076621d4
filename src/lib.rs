//! # rowpack
//!
//! Buffered appending for columnar, append-only record stores.
//!
//! Callers assemble typed [`records::Record`]s against a
//! [`records::RecordSchema`], push them into an [`buffer::AppendBuffer`],
//! and the buffer commits them in blocks through an
//! [`store::ExtensibleStore`] backend.
//!
//! ```text
//! RecordBuilder ──> Record ──> AppendBuffer ──> Dataset
//!                                 │                │
//!                         batch of max_size    .rows / .heap files
//!                         flushed as a block   (or in-memory Vecs)
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `StorageKind` / `Value`: the closed set of field kinds |
//! | [`records`] | schema, packed layout, builder, encoder, read-back views |
//! | [`store`] | `ExtensibleStore` / `Dataset` traits, memory and file backends |
//! | [`buffer`] | the chunked append buffer on top of a dataset |
//!
//! ## Example
//!
//! ```no_run
//! use rowpack::{AppendBuffer, FieldDef, FileStore, RecordBuilder, RecordSchema, StorageKind};
//!
//! fn main() -> eyre::Result<()> {
//!     let schema = RecordSchema::new(vec![
//!         FieldDef::new("n", StorageKind::Int4),
//!         FieldDef::new("name", StorageKind::Text),
//!         FieldDef::new("scores", StorageKind::seq(StorageKind::Float8)),
//!     ])?;
//!
//!     let mut store = FileStore::open("./data")?;
//!     let mut buffer = AppendBuffer::create(&mut store, "events", schema.clone(), 10)?;
//!
//!     for n in 0..98 {
//!         let mut builder = RecordBuilder::new(&schema);
//!         builder.set_int4(0, n)?;
//!         builder.set_text(1, "event")?;
//!         builder.set(2, vec![0.5f64, 1.5])?;
//!         buffer.push_back(builder.finish()?)?;
//!     }
//!     buffer.sync()?;
//!     Ok(())
//! }
//! ```
//!
//! Records are validated at `push_back`; the batch flushes automatically
//! when it reaches `max_size` and manually via `flush()`/`sync()`. On-store
//! records are packed little-endian with interior padding removed, and
//! variable-length fields (text, nested sequences) are encoded as
//! self-contained payloads in a sibling heap.

pub mod buffer;
pub mod records;
pub mod store;
pub mod types;

pub use buffer::{AppendBuffer, DEFAULT_MAX_SIZE};
pub use records::{
    encode_record, FieldDef, PackedLayout, Record, RecordBuilder, RecordSchema, RowPayload,
    RowRef, RowView, SeqView,
};
pub use store::{
    Dataset, DatasetOptions, ExtensibleStore, FileDataset, FileStore, MemoryDataset, MemoryStore,
};
pub use types::{StorageKind, Value, MAX_SEQ_DEPTH};
