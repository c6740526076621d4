//! # Zero-Copy Read-Back Views
//!
//! `RowView` reads a committed record without copying: fixed fields are
//! decoded directly from the packed fixed region, variable fields through
//! `SeqView`, which walks the recursive payload format produced by
//! [`crate::records::encode`].
//!
//! Views borrow from the dataset's committed bytes. They are plain
//! (slice, layout) pairs derived on demand; nothing here outlives or
//! aliases mutable state.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::records::layout::PackedLayout;
use crate::types::StorageKind;

/// Borrowed committed row: packed fixed region plus one payload slice per
/// variable field, in schema order.
#[derive(Debug, Clone)]
pub struct RowRef<'a> {
    pub fixed: &'a [u8],
    pub vars: SmallVec<[&'a [u8]; 4]>,
}

impl<'a> RowRef<'a> {
    /// Attaches a layout, yielding typed accessors.
    pub fn view(&self, layout: &'a PackedLayout) -> Result<RowView<'a>> {
        RowView::new(self.fixed, self.vars.clone(), layout)
    }
}

#[derive(Debug, Clone)]
pub struct RowView<'a> {
    fixed: &'a [u8],
    vars: SmallVec<[&'a [u8]; 4]>,
    layout: &'a PackedLayout,
}

impl<'a> RowView<'a> {
    pub fn new(
        fixed: &'a [u8],
        vars: SmallVec<[&'a [u8]; 4]>,
        layout: &'a PackedLayout,
    ) -> Result<Self> {
        ensure!(
            fixed.len() == layout.record_size(),
            "fixed region is {} bytes, layout expects {}",
            fixed.len(),
            layout.record_size()
        );
        ensure!(
            vars.len() == layout.var_field_count(),
            "row has {} var payloads, layout expects {}",
            vars.len(),
            layout.var_field_count()
        );
        Ok(Self {
            fixed,
            vars,
            layout,
        })
    }

    fn fixed_bytes(&self, field_idx: usize, expect: &StorageKind) -> Result<&'a [u8]> {
        let field = self.layout.field(field_idx);
        ensure!(
            field.kind == *expect,
            "field '{}' is {:?}, not {:?}",
            field.name,
            field.kind,
            expect
        );
        Ok(&self.fixed[field.offset..field.offset + field.size])
    }

    fn var_bytes(&self, field_idx: usize) -> Result<&'a [u8]> {
        let pos = self.layout.var_field_position(field_idx).ok_or_else(|| {
            eyre::eyre!(
                "field '{}' is not variable-length",
                self.layout.field(field_idx).name
            )
        })?;
        Ok(self.vars[pos])
    }

    pub fn get_bool(&self, field_idx: usize) -> Result<bool> {
        let bytes = self.fixed_bytes(field_idx, &StorageKind::Bool)?;
        Ok(bytes[0] != 0)
    }

    pub fn get_int2(&self, field_idx: usize) -> Result<i16> {
        let bytes = self.fixed_bytes(field_idx, &StorageKind::Int2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_int4(&self, field_idx: usize) -> Result<i32> {
        let bytes = self.fixed_bytes(field_idx, &StorageKind::Int4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_int8(&self, field_idx: usize) -> Result<i64> {
        let bytes = self.fixed_bytes(field_idx, &StorageKind::Int8)?;
        Ok(i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn get_float4(&self, field_idx: usize) -> Result<f32> {
        let bytes = self.fixed_bytes(field_idx, &StorageKind::Float4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_float8(&self, field_idx: usize) -> Result<f64> {
        let bytes = self.fixed_bytes(field_idx, &StorageKind::Float8)?;
        Ok(f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn get_text(&self, field_idx: usize) -> Result<&'a str> {
        let field = self.layout.field(field_idx);
        ensure!(
            field.kind == StorageKind::Text,
            "field '{}' is {:?}, not Text",
            field.name,
            field.kind
        );
        let bytes = self.var_bytes(field_idx)?;
        std::str::from_utf8(bytes)
            .map_err(|e| eyre::eyre!("invalid UTF-8 in text field '{}': {}", field.name, e))
    }

    pub fn get_seq(&self, field_idx: usize) -> Result<SeqView<'a>> {
        let field = self.layout.field(field_idx);
        let elem = match &field.kind {
            StorageKind::Seq(elem) => elem,
            other => bail!("field '{}' is {:?}, not a sequence", field.name, other),
        };
        SeqView::new(self.var_bytes(field_idx)?, elem)
    }
}

/// View over one encoded sequence payload.
#[derive(Debug, Clone, Copy)]
pub struct SeqView<'a> {
    data: &'a [u8],
    elem: &'a StorageKind,
    len: usize,
}

impl<'a> SeqView<'a> {
    pub fn new(data: &'a [u8], elem: &'a StorageKind) -> Result<Self> {
        ensure!(
            data.len() >= 4,
            "sequence payload too short: {} bytes",
            data.len()
        );
        let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if let Some(size) = elem.fixed_size() {
            ensure!(
                data.len() == 4 + len * size,
                "sequence payload size mismatch: {} bytes for {} elements of {}",
                data.len(),
                len,
                size
            );
        } else {
            ensure!(
                data.len() >= 4 + len * 4,
                "sequence payload too short for offset table: {} bytes, {} elements",
                data.len(),
                len
            );
        }

        Ok(Self { data, elem, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elem_kind(&self) -> &'a StorageKind {
        self.elem
    }

    fn fixed_elem(&self, idx: usize, expect: &StorageKind) -> Result<&'a [u8]> {
        ensure!(
            idx < self.len,
            "sequence index {} out of bounds (len={})",
            idx,
            self.len
        );
        ensure!(
            self.elem == expect,
            "sequence element kind is {:?}, not {:?}",
            self.elem,
            expect
        );
        let size = expect.fixed_size().expect("scalar kind has a size");
        let start = 4 + idx * size;
        Ok(&self.data[start..start + size])
    }

    fn var_elem(&self, idx: usize) -> Result<&'a [u8]> {
        ensure!(
            idx < self.len,
            "sequence index {} out of bounds (len={})",
            idx,
            self.len
        );
        let table = 4;
        let data_start = table + self.len * 4;
        let read = |i: usize| -> usize {
            let p = table + i * 4;
            u32::from_le_bytes([self.data[p], self.data[p + 1], self.data[p + 2], self.data[p + 3]])
                as usize
        };
        let start = if idx == 0 { 0 } else { read(idx - 1) };
        let end = read(idx);
        ensure!(
            start <= end && data_start + end <= self.data.len(),
            "corrupt sequence offsets: element {} spans {}..{} of {} data bytes",
            idx,
            start,
            end,
            self.data.len() - data_start
        );
        Ok(&self.data[data_start + start..data_start + end])
    }

    pub fn get_bool(&self, idx: usize) -> Result<bool> {
        let bytes = self.fixed_elem(idx, &StorageKind::Bool)?;
        Ok(bytes[0] != 0)
    }

    pub fn get_int2(&self, idx: usize) -> Result<i16> {
        let bytes = self.fixed_elem(idx, &StorageKind::Int2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_int4(&self, idx: usize) -> Result<i32> {
        let bytes = self.fixed_elem(idx, &StorageKind::Int4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_int8(&self, idx: usize) -> Result<i64> {
        let bytes = self.fixed_elem(idx, &StorageKind::Int8)?;
        Ok(i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn get_float4(&self, idx: usize) -> Result<f32> {
        let bytes = self.fixed_elem(idx, &StorageKind::Float4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_float8(&self, idx: usize) -> Result<f64> {
        let bytes = self.fixed_elem(idx, &StorageKind::Float8)?;
        Ok(f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn get_text(&self, idx: usize) -> Result<&'a str> {
        ensure!(
            *self.elem == StorageKind::Text,
            "sequence element kind is {:?}, not Text",
            self.elem
        );
        let bytes = self.var_elem(idx)?;
        std::str::from_utf8(bytes)
            .map_err(|e| eyre::eyre!("invalid UTF-8 in sequence element {}: {}", idx, e))
    }

    /// Descends into a nested sequence element.
    pub fn get_seq(&self, idx: usize) -> Result<SeqView<'a>> {
        let inner = match self.elem {
            StorageKind::Seq(inner) => inner,
            other => bail!("sequence element kind is {:?}, not a sequence", other),
        };
        SeqView::new(self.var_elem(idx)?, inner)
    }
}
