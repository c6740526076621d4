//! # Record Schema
//!
//! A `RecordSchema` is the ordered list of fields making up one record.
//! It is validated once at construction and thereafter immutable; the
//! packed on-store layout is derived from it by
//! [`crate::records::layout::PackedLayout`].
//!
//! Besides the field list, the schema computes the *raw* layout: the byte
//! offsets the fields would occupy in a natively aligned in-memory struct,
//! including alignment padding. The raw layout exists only as the input to
//! padding removal; no live data is ever addressed through it.

use eyre::{ensure, Result};
use hashbrown::HashSet;

use crate::records::Record;
use crate::types::{check_kind, StorageKind};

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: StorageKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: StorageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordSchema {
    fields: Vec<FieldDef>,
    raw_offsets: Vec<usize>,
    raw_size: usize,
    var_field_indices: Vec<usize>,
}

impl RecordSchema {
    /// Validates and builds a schema.
    ///
    /// Configuration errors (empty field list, duplicate names, nesting
    /// depth overflow) are reported here, before any dataset is created.
    pub fn new(fields: Vec<FieldDef>) -> Result<Self> {
        ensure!(!fields.is_empty(), "record schema must have at least one field");

        {
            let mut seen = HashSet::new();
            for field in &fields {
                ensure!(!field.name.is_empty(), "field name cannot be empty");
                ensure!(
                    seen.insert(field.name.as_str()),
                    "duplicate field name '{}'",
                    field.name
                );
                check_kind(&field.kind)?;
            }
        }

        let mut raw_offsets = Vec::with_capacity(fields.len());
        let mut var_field_indices = Vec::new();
        let mut offset = 0usize;
        let mut max_align = 1usize;

        for (idx, field) in fields.iter().enumerate() {
            let align = field.kind.align();
            max_align = max_align.max(align);
            offset = offset.next_multiple_of(align);
            raw_offsets.push(offset);
            offset += field.kind.raw_size();
            if field.kind.is_variable() {
                var_field_indices.push(idx);
            }
        }

        let raw_size = offset.next_multiple_of(max_align);

        Ok(Self {
            fields,
            raw_offsets,
            raw_size,
            var_field_indices,
        })
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, idx: usize) -> Option<&FieldDef> {
        self.fields.get(idx)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Byte offset of the field in the aligned in-memory representation.
    pub fn raw_offset(&self, idx: usize) -> usize {
        self.raw_offsets[idx]
    }

    /// Size of the aligned in-memory representation, padding included.
    pub fn raw_size(&self) -> usize {
        self.raw_size
    }

    pub fn var_field_count(&self) -> usize {
        self.var_field_indices.len()
    }

    pub fn var_field_indices(&self) -> &[usize] {
        &self.var_field_indices
    }

    /// Position of a field within the variable-field set, if variable.
    pub fn var_field_position(&self, field_idx: usize) -> Option<usize> {
        self.var_field_indices
            .iter()
            .position(|&idx| idx == field_idx)
    }

    /// Validates a record's arity and field kinds against this schema.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        ensure!(
            record.values().len() == self.fields.len(),
            "record has {} values, schema has {} fields",
            record.values().len(),
            self.fields.len()
        );
        for (idx, (value, field)) in record.values().iter().zip(&self.fields).enumerate() {
            ensure!(
                value.kind_matches(&field.kind),
                "field '{}' (index {}): value kind {} does not match schema kind {:?}",
                field.name,
                idx,
                value.describe(),
                field.kind
            );
        }
        Ok(())
    }
}
