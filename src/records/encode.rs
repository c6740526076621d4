//! # Record Encoding
//!
//! Turns a validated [`Record`] into the bytes a dataset commits. This is
//! the serialization boundary where variable-length views are derived:
//! the encoder reads each owned `String`/`Vec` exactly once, bottom-up
//! (innermost sequences first), and emits a self-contained byte payload.
//! Nothing is cached between flushes, so a sequence that reallocated,
//! moved, or was mutated since the record was built is always read at its
//! current address.
//!
//! ## Variable payload format
//!
//! | Kind | Encoding |
//! |------|----------|
//! | `Text` | raw UTF-8 bytes (length carried by the reference slot or parent offset table) |
//! | `Seq` of fixed elements | `u32` count + contiguous LE elements |
//! | `Seq` of variable elements | `u32` count + `u32` end-offset table + concatenated child payloads |
//!
//! End offsets are relative to the start of the concatenated child data,
//! so child `i` spans `[end[i-1], end[i])` with `end[-1] = 0`. Sequences
//! of bool store one byte per element.

use eyre::{bail, ensure, Result};

use crate::records::builder::Record;
use crate::records::layout::PackedLayout;
use crate::types::{StorageKind, Value};

/// One record's committed form: the packed fixed region plus one payload
/// per variable field, in schema order. Reference slots inside `fixed`
/// are zero; the dataset patches them when it places the payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPayload {
    pub fixed: Vec<u8>,
    pub vars: Vec<Vec<u8>>,
}

/// Encodes a record against its packed layout.
///
/// The record must already have been validated against the schema the
/// layout was derived from; mismatches are still caught and reported.
pub fn encode_record(record: &Record, layout: &PackedLayout) -> Result<RowPayload> {
    ensure!(
        record.values().len() == layout.field_count(),
        "record has {} values, layout has {} fields",
        record.values().len(),
        layout.field_count()
    );

    let mut fixed = vec![0u8; layout.record_size()];
    let mut vars = Vec::with_capacity(layout.var_field_count());

    for (idx, value) in record.values().iter().enumerate() {
        let field = layout.field(idx);
        if field.kind.is_variable() {
            let mut payload = Vec::new();
            encode_var(value, &field.kind, &mut payload)?;
            vars.push(payload);
        } else {
            write_scalar(&mut fixed[field.offset..field.offset + field.size], value)?;
        }
    }

    Ok(RowPayload { fixed, vars })
}

fn write_scalar(buf: &mut [u8], value: &Value) -> Result<()> {
    match value {
        Value::Bool(v) => buf.copy_from_slice(&[*v as u8]),
        Value::Int2(v) => buf.copy_from_slice(&v.to_le_bytes()),
        Value::Int4(v) => buf.copy_from_slice(&v.to_le_bytes()),
        Value::Int8(v) => buf.copy_from_slice(&v.to_le_bytes()),
        Value::Float4(v) => buf.copy_from_slice(&v.to_le_bytes()),
        Value::Float8(v) => buf.copy_from_slice(&v.to_le_bytes()),
        other => bail!("expected scalar value, got {}", other.describe()),
    }
    Ok(())
}

/// Recursively encodes a variable-length value. Children are encoded
/// before the parent's offset table is finalized, which is the bottom-up
/// synchronization order nested views require.
fn encode_var(value: &Value, kind: &StorageKind, out: &mut Vec<u8>) -> Result<()> {
    match (value, kind) {
        (Value::Text(text), StorageKind::Text) => {
            out.extend_from_slice(text.as_bytes());
            Ok(())
        }
        (Value::Seq(items), StorageKind::Seq(elem)) => {
            ensure!(
                items.len() <= u32::MAX as usize,
                "sequence of {} elements exceeds u32 count",
                items.len()
            );
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());

            if let Some(size) = elem.fixed_size() {
                out.reserve(items.len() * size);
                for item in items {
                    let start = out.len();
                    out.resize(start + size, 0);
                    write_scalar(&mut out[start..start + size], item)?;
                }
            } else {
                // Offset table is patched after the children are encoded;
                // entries are end offsets relative to the data section.
                let table_start = out.len();
                out.resize(table_start + items.len() * 4, 0);
                let data_start = out.len();

                for (i, item) in items.iter().enumerate() {
                    encode_var(item, elem, out)?;
                    let end = out.len() - data_start;
                    ensure!(
                        end <= u32::MAX as usize,
                        "sequence payload of {} bytes exceeds u32 offset",
                        end
                    );
                    let entry = table_start + i * 4;
                    out[entry..entry + 4].copy_from_slice(&(end as u32).to_le_bytes());
                }
            }
            Ok(())
        }
        (value, kind) => bail!(
            "value kind {} does not match storage kind {:?}",
            value.describe(),
            kind
        ),
    }
}
