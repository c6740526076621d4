//! # Packed Storage Layout
//!
//! A `PackedLayout` is the storage-side twin of a schema's raw in-memory
//! layout: same fields, same order, but with every alignment gap removed
//! so committed blocks carry no padding bytes.
//!
//! ## On-store record layout
//!
//! ```text
//! +-------------------+-------------------+------------------------+
//! | fixed field bytes | ...               | var reference slots    |
//! | (packed, LE)      |                   | interleaved in order   |
//! +-------------------+-------------------+------------------------+
//! ```
//!
//! Fields are laid out strictly in schema order at a running-sum offset.
//! Fixed-width fields occupy exactly their storage size. Variable-length
//! fields occupy a [`VAR_SLOT_SIZE`]-byte reference slot (u64 heap offset
//! + u32 byte length); their payload is written to the dataset's var heap
//! at commit time and the slot is patched to point at it. The in-memory
//! backend keeps payloads out of line and leaves the slots zeroed.
//!
//! The computation is pure: it depends only on the schema, never on live
//! data. The append buffer computes it once at construction and reuses it
//! for every flush.

use eyre::Result;

use crate::records::schema::RecordSchema;
use crate::types::StorageKind;

/// On-store size of a variable-length field's reference slot.
pub const VAR_SLOT_SIZE: usize = 12;

#[derive(Debug, Clone)]
pub struct PackedField {
    pub name: String,
    pub kind: StorageKind,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct PackedLayout {
    fields: Vec<PackedField>,
    record_size: usize,
    raw_size: usize,
    var_field_indices: Vec<usize>,
}

impl PackedLayout {
    /// Derives the packed layout for a schema.
    ///
    /// The schema has already rejected unrepresentable field kinds, so
    /// this cannot fail today; the `Result` keeps the construction seam
    /// uniform with the rest of the configuration path.
    pub fn for_schema(schema: &RecordSchema) -> Result<Self> {
        let mut fields = Vec::with_capacity(schema.field_count());
        let mut offset = 0usize;

        for def in schema.fields() {
            let size = def.kind.fixed_size().unwrap_or(VAR_SLOT_SIZE);
            fields.push(PackedField {
                name: def.name.clone(),
                kind: def.kind.clone(),
                offset,
                size,
            });
            offset += size;
        }

        Ok(Self {
            fields,
            record_size: offset,
            raw_size: schema.raw_size(),
            var_field_indices: schema.var_field_indices().to_vec(),
        })
    }

    /// Total on-store size of one record's fixed region.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, idx: usize) -> &PackedField {
        &self.fields[idx]
    }

    pub fn fields(&self) -> &[PackedField] {
        &self.fields
    }

    pub fn field_offset(&self, idx: usize) -> usize {
        self.fields[idx].offset
    }

    pub fn var_field_indices(&self) -> &[usize] {
        &self.var_field_indices
    }

    pub fn var_field_count(&self) -> usize {
        self.var_field_indices.len()
    }

    /// Position of a field within the variable-field set, if variable.
    pub fn var_field_position(&self, field_idx: usize) -> Option<usize> {
        self.var_field_indices
            .iter()
            .position(|&idx| idx == field_idx)
    }

    /// Bytes saved per record relative to the aligned in-memory layout.
    pub fn padding_removed(&self) -> usize {
        self.raw_size.saturating_sub(self.record_size)
    }
}
