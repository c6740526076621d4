//! # Record Layer
//!
//! Everything between a caller's structured data and the bytes a dataset
//! commits:
//!
//! - `schema`: validated field list + raw (aligned) in-memory layout
//! - `layout`: packed on-store layout with interior padding removed
//! - `builder`: `Record` values and the type-checked `RecordBuilder`
//! - `encode`: the serialization boundary where variable-length views are
//!   derived bottom-up and emitted as self-contained payloads
//! - `view`: zero-copy read-back (`RowView`, `SeqView`)
//!
//! ## On-store record layout
//!
//! ```text
//! +---------------------------+     +---------------------------+
//! | fixed region              |     | var heap                  |
//! | packed scalars + 12-byte  | --> | one payload per var field |
//! | var reference slots       |     | (recursive seq encoding)  |
//! +---------------------------+     +---------------------------+
//! ```
//!
//! The fixed region is constant-size per schema (`PackedLayout::
//! record_size`), which is what lets a dataset address row N by offset
//! arithmetic. Variable payloads are placed by the dataset at commit time.

pub mod builder;
pub mod encode;
pub mod layout;
pub mod schema;
pub mod view;

pub use builder::{Record, RecordBuilder};
pub use encode::{encode_record, RowPayload};
pub use layout::{PackedLayout, VAR_SLOT_SIZE};
pub use schema::{FieldDef, RecordSchema};
pub use view::{RowRef, RowView, SeqView};
