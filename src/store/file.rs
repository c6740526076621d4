//! # File-Backed Store
//!
//! A `FileStore` keeps each dataset in one or two memory-mapped files
//! under its root directory:
//!
//! ```text
//! root/
//! ├── events.rows    # 64-byte header + fixed-size record slots
//! └── events.heap    # 64-byte header + var-length payloads (only if
//!                    #   the layout has variable fields)
//! ```
//!
//! ## Rows file
//!
//! ```text
//! +--------------------+----------------------+
//! | RowsFileHeader 64B | slot 0 | slot 1 | .. |
//! +--------------------+----------------------+
//! ```
//!
//! Each slot is exactly `PackedLayout::record_size()` bytes: packed
//! scalars plus a 12-byte reference (u64 heap offset + u32 byte length)
//! per variable field. The file grows in chunk-aligned steps, `chunk_rows`
//! slots at a time, so one buffer flush lands in one chunk.
//!
//! ## Heap file
//!
//! Variable payloads are appended, never moved or reclaimed; the header
//! tracks the next free byte. Offsets stored in reference slots are
//! absolute file offsets. A zero-length field stores (0, 0) and reads
//! back as the empty slice without touching the heap.
//!
//! ## Headers
//!
//! Headers are `zerocopy`-typed, little-endian, validated on open (magic,
//! version, record size, variable-field count). Header fields are updated
//! in place on every extend/write; durability is deferred to `sync()`.

use std::path::{Path, PathBuf};

use eyre::{bail, ensure, Result, WrapErr};
use smallvec::SmallVec;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::records::{PackedLayout, RowPayload, RowRef, VAR_SLOT_SIZE};
use crate::store::mapped::MappedFile;
use crate::store::{Dataset, DatasetOptions, ExtensibleStore};

pub const ROWS_MAGIC: &[u8; 8] = b"rpk.rows";
pub const HEAP_MAGIC: &[u8; 8] = b"rpk.heap";
pub const CURRENT_VERSION: u32 = 1;
pub const FILE_HEADER_SIZE: usize = 64;

/// Heap files grow in steps of this many bytes.
const HEAP_GROWTH: u64 = 64 * 1024;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RowsFileHeader {
    magic: [u8; 8],
    version: U32,
    record_size: U32,
    chunk_rows: U32,
    var_fields: U32,
    length: U64,
    reserved: [u8; 32],
}

const _: () = assert!(std::mem::size_of::<RowsFileHeader>() == FILE_HEADER_SIZE);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct HeapFileHeader {
    magic: [u8; 8],
    version: U32,
    reserved0: U32,
    used: U64,
    reserved: [u8; 40],
}

const _: () = assert!(std::mem::size_of::<HeapFileHeader>() == FILE_HEADER_SIZE);

fn read_header<H: FromBytes>(mapped: &MappedFile) -> Result<H> {
    let bytes = mapped.bytes(0, FILE_HEADER_SIZE)?;
    H::read_from_bytes(bytes).map_err(|e| eyre::eyre!("failed to parse file header: {:?}", e))
}

fn write_header<H: IntoBytes + Immutable>(mapped: &mut MappedFile, header: &H) -> Result<()> {
    mapped
        .bytes_mut(0, FILE_HEADER_SIZE)?
        .copy_from_slice(header.as_bytes());
    Ok(())
}

/// Store rooted at a directory, one dataset per name.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create store directory '{}'", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rows_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.rows"))
    }

    fn heap_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.heap"))
    }

    /// Reopens an existing dataset, validating its header against the
    /// layout it will be read with.
    pub fn open_dataset(&self, name: &str, layout: &PackedLayout) -> Result<FileDataset> {
        check_name(name)?;

        let rows = MappedFile::open(self.rows_path(name))?;
        let header: RowsFileHeader = read_header(&rows)?;

        ensure!(
            &header.magic == ROWS_MAGIC,
            "'{}' is not a rowpack rows file",
            name
        );
        ensure!(
            header.version.get() == CURRENT_VERSION,
            "dataset '{}' has unsupported version {} (expected {})",
            name,
            header.version.get(),
            CURRENT_VERSION
        );
        ensure!(
            header.record_size.get() as usize == layout.record_size(),
            "dataset '{}' record size {} does not match layout record size {}",
            name,
            header.record_size.get(),
            layout.record_size()
        );
        ensure!(
            header.var_fields.get() as usize == layout.var_field_count(),
            "dataset '{}' has {} variable fields, layout has {}",
            name,
            header.var_fields.get(),
            layout.var_field_count()
        );

        let heap = if layout.var_field_count() > 0 {
            let heap = MappedFile::open(self.heap_path(name))?;
            let heap_header: HeapFileHeader = read_header(&heap)?;
            ensure!(
                &heap_header.magic == HEAP_MAGIC,
                "'{}' heap file is not a rowpack heap file",
                name
            );
            ensure!(
                heap_header.version.get() == CURRENT_VERSION,
                "dataset '{}' heap has unsupported version {}",
                name,
                heap_header.version.get()
            );
            Some((heap, heap_header.used.get()))
        } else {
            None
        };

        Ok(FileDataset {
            record_size: header.record_size.get() as usize,
            chunk_rows: header.chunk_rows.get() as usize,
            var_slot_offsets: var_slot_offsets(layout),
            length: header.length.get(),
            heap_used: heap.as_ref().map(|(_, used)| *used).unwrap_or(0),
            rows,
            heap: heap.map(|(mapped, _)| mapped),
        })
    }
}

fn check_name(name: &str) -> Result<()> {
    ensure!(!name.is_empty(), "dataset name cannot be empty");
    ensure!(
        !name.contains(['/', '\\']) && name != "." && name != "..",
        "dataset name '{}' must not contain path separators",
        name
    );
    Ok(())
}

fn var_slot_offsets(layout: &PackedLayout) -> Vec<usize> {
    layout
        .var_field_indices()
        .iter()
        .map(|&idx| layout.field_offset(idx))
        .collect()
}

impl ExtensibleStore for FileStore {
    type Dataset = FileDataset;

    fn create_dataset(
        &mut self,
        name: &str,
        layout: &PackedLayout,
        options: DatasetOptions,
    ) -> Result<Self::Dataset> {
        check_name(name)?;
        ensure!(options.chunk_rows > 0, "chunk_rows must be at least 1");
        ensure!(
            layout.record_size() <= u32::MAX as usize,
            "record size {} exceeds u32",
            layout.record_size()
        );

        let mut rows = MappedFile::create(self.rows_path(name), FILE_HEADER_SIZE as u64)
            .wrap_err_with(|| format!("dataset '{}' is already bound or unusable", name))?;
        let header = RowsFileHeader {
            magic: *ROWS_MAGIC,
            version: U32::new(CURRENT_VERSION),
            record_size: U32::new(layout.record_size() as u32),
            chunk_rows: U32::new(options.chunk_rows as u32),
            var_fields: U32::new(layout.var_field_count() as u32),
            length: U64::new(0),
            reserved: [0u8; 32],
        };
        write_header(&mut rows, &header)?;

        let heap = if layout.var_field_count() > 0 {
            let mut heap = MappedFile::create(self.heap_path(name), FILE_HEADER_SIZE as u64)
                .wrap_err_with(|| format!("dataset '{}' heap file is already bound", name))?;
            let heap_header = HeapFileHeader {
                magic: *HEAP_MAGIC,
                version: U32::new(CURRENT_VERSION),
                reserved0: U32::new(0),
                used: U64::new(FILE_HEADER_SIZE as u64),
                reserved: [0u8; 40],
            };
            write_header(&mut heap, &heap_header)?;
            Some(heap)
        } else {
            None
        };

        Ok(FileDataset {
            record_size: layout.record_size(),
            chunk_rows: options.chunk_rows,
            var_slot_offsets: var_slot_offsets(layout),
            length: 0,
            heap_used: if heap.is_some() {
                FILE_HEADER_SIZE as u64
            } else {
                0
            },
            rows,
            heap,
        })
    }
}

#[derive(Debug)]
pub struct FileDataset {
    rows: MappedFile,
    heap: Option<MappedFile>,
    record_size: usize,
    chunk_rows: usize,
    var_slot_offsets: Vec<usize>,
    length: u64,
    heap_used: u64,
}

impl FileDataset {
    fn slot_offset(&self, idx: u64) -> u64 {
        FILE_HEADER_SIZE as u64 + idx * self.record_size as u64
    }

    fn update_length(&mut self, new_len: u64) -> Result<()> {
        let mut header: RowsFileHeader = read_header(&self.rows)?;
        header.length = U64::new(new_len);
        write_header(&mut self.rows, &header)?;
        self.length = new_len;
        Ok(())
    }

    /// Appends a payload to the heap, growing the heap file in
    /// [`HEAP_GROWTH`] steps, and returns its absolute offset. The heap
    /// header is persisted by `write_range` once the whole batch landed.
    fn heap_append(&mut self, payload: &[u8]) -> Result<u64> {
        let offset = self.heap_used;
        let needed = offset + payload.len() as u64;

        let heap = self
            .heap
            .as_mut()
            .ok_or_else(|| eyre::eyre!("dataset has no variable fields but got a var payload"))?;
        if needed > heap.len() {
            heap.grow(needed.next_multiple_of(HEAP_GROWTH))?;
        }
        heap.bytes_mut(offset, payload.len())?.copy_from_slice(payload);

        self.heap_used = needed;
        Ok(offset)
    }

    fn persist_heap_used(&mut self) -> Result<()> {
        let used = self.heap_used;
        let heap = self
            .heap
            .as_mut()
            .ok_or_else(|| eyre::eyre!("dataset has no heap file"))?;
        let mut header: HeapFileHeader = read_header(heap)?;
        header.used = U64::new(used);
        write_header(heap, &header)
    }

    fn write_rows(&mut self, start: u64, rows: &[RowPayload]) -> Result<()> {
        for (i, row) in rows.iter().enumerate() {
            let idx = start + i as u64;
            ensure!(
                row.fixed.len() == self.record_size,
                "row {} fixed region is {} bytes, dataset expects {}",
                idx,
                row.fixed.len(),
                self.record_size
            );
            ensure!(
                row.vars.len() == self.var_slot_offsets.len(),
                "row {} has {} var payloads, dataset expects {}",
                idx,
                row.vars.len(),
                self.var_slot_offsets.len()
            );

            let at = self.slot_offset(idx);
            self.rows
                .bytes_mut(at, self.record_size)?
                .copy_from_slice(&row.fixed);

            for (slot, payload) in row.vars.iter().enumerate() {
                ensure!(
                    payload.len() <= u32::MAX as usize,
                    "row {} var payload of {} bytes exceeds u32",
                    idx,
                    payload.len()
                );
                if payload.is_empty() {
                    self.patch_var_slot(idx, slot, 0, 0)?;
                } else {
                    let offset = self.heap_append(payload)?;
                    self.patch_var_slot(idx, slot, offset, payload.len() as u32)?;
                }
            }
        }
        Ok(())
    }

    fn patch_var_slot(&mut self, row_idx: u64, slot: usize, offset: u64, len: u32) -> Result<()> {
        let at = self.slot_offset(row_idx) + self.var_slot_offsets[slot] as u64;
        let bytes = self.rows.bytes_mut(at, VAR_SLOT_SIZE)?;
        bytes[0..8].copy_from_slice(&offset.to_le_bytes());
        bytes[8..12].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    /// Bytes of the heap file in use, header included (diagnostic only).
    pub fn heap_used(&self) -> u64 {
        self.heap_used
    }
}

impl Dataset for FileDataset {
    fn extend(&mut self, new_len: u64) -> Result<()> {
        ensure!(
            new_len >= self.length,
            "cannot shrink dataset from {} to {} rows",
            self.length,
            new_len
        );
        if new_len == self.length {
            return Ok(());
        }

        // Capacity grows chunk-aligned so each flush block lands whole.
        let capacity_rows = new_len.div_ceil(self.chunk_rows as u64) * self.chunk_rows as u64;
        let needed = self.slot_offset(capacity_rows);
        self.rows.grow(needed)?;

        self.update_length(new_len)
    }

    fn write_range(&mut self, start: u64, rows: &[RowPayload]) -> Result<()> {
        let end = start + rows.len() as u64;
        ensure!(
            end <= self.length,
            "write range {}..{} exceeds extended length {}",
            start,
            end,
            self.length
        );

        // Heap space taken by a partial write is reclaimed on failure, so
        // a retried write lands in the same place instead of orphaning
        // the first copies.
        let heap_mark = self.heap_used;
        let mut outcome = self.write_rows(start, rows);
        if outcome.is_ok() && self.heap_used != heap_mark {
            outcome = self.persist_heap_used();
        }
        if let Err(err) = outcome {
            self.heap_used = heap_mark;
            return Err(err);
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn row(&self, idx: u64) -> Result<RowRef<'_>> {
        ensure!(
            idx < self.length,
            "row {} out of bounds (len={})",
            idx,
            self.length
        );

        let fixed = self.rows.bytes(self.slot_offset(idx), self.record_size)?;

        let mut vars: SmallVec<[&[u8]; 4]> = SmallVec::new();
        for &slot_offset in &self.var_slot_offsets {
            let slot = &fixed[slot_offset..slot_offset + VAR_SLOT_SIZE];
            let offset = u64::from_le_bytes([
                slot[0], slot[1], slot[2], slot[3], slot[4], slot[5], slot[6], slot[7],
            ]);
            let len = u32::from_le_bytes([slot[8], slot[9], slot[10], slot[11]]) as usize;

            if len == 0 {
                vars.push(&[]);
                continue;
            }

            let heap = match &self.heap {
                Some(heap) => heap,
                None => bail!("row {} references a heap this dataset does not have", idx),
            };
            ensure!(
                offset >= FILE_HEADER_SIZE as u64 && offset + len as u64 <= self.heap_used,
                "row {} heap reference {}..{} outside used heap ({}..{})",
                idx,
                offset,
                offset + len as u64,
                FILE_HEADER_SIZE,
                self.heap_used
            );
            vars.push(heap.bytes(offset, len)?);
        }

        Ok(RowRef { fixed, vars })
    }

    fn sync(&self) -> Result<()> {
        self.rows.sync()?;
        if let Some(heap) = &self.heap {
            heap.sync()?;
        }
        Ok(())
    }
}
