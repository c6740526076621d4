//! # Memory-Mapped File Primitive
//!
//! `MappedFile` is the low-level building block under the file-backed
//! dataset: a growable file mapped into the address space, accessed as
//! byte ranges.
//!
//! Growing remaps the file, which invalidates the old mapping. Instead of
//! runtime guards, the borrow checker enforces safety: `bytes()` borrows
//! `&self`, `grow()` takes `&mut self`, so no slice into the old mapping
//! can be alive across a remap.

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

#[derive(Debug)]
pub(crate) struct MappedFile {
    file: File,
    mmap: MmapMut,
    len: u64,
}

impl MappedFile {
    /// Creates a new file of `initial_len` bytes. Fails if the path
    /// already exists, which is how the store detects an already-bound
    /// dataset name.
    pub fn create<P: AsRef<Path>>(path: P, initial_len: u64) -> Result<Self> {
        let path = path.as_ref();

        ensure!(initial_len > 0, "initial file length must be at least 1 byte");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create dataset file '{}'", path.display()))?;

        file.set_len(initial_len)
            .wrap_err_with(|| format!("failed to size '{}' to {} bytes", path.display(), initial_len))?;

        // SAFETY: the file was just created with exclusive access and sized
        // to initial_len. The mapping's lifetime is tied to MappedFile and
        // all access goes through bytes()/bytes_mut(), which bounds-check.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            len: initial_len,
        })
    }

    /// Opens an existing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open dataset file '{}'", path.display()))?;

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        ensure!(len > 0, "cannot map empty dataset file '{}'", path.display());

        // SAFETY: same argument as create(); dataset files are not shared
        // with other writers by the store's single-writer discipline.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self { file, mmap, len })
    }

    /// Grows the file to `new_len` bytes and remaps. No-op if the file is
    /// already at least that large.
    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len {
            return Ok(());
        }

        self.mmap
            .flush()
            .wrap_err("failed to flush mapping before grow")?;

        self.file
            .set_len(new_len)
            .wrap_err_with(|| format!("failed to extend file to {} bytes", new_len))?;

        // SAFETY: grow() holds &mut self, so the borrow checker guarantees
        // no outstanding slices into the old mapping. The old mapping was
        // flushed above and is dropped by the assignment.
        self.mmap =
            unsafe { MmapMut::map_mut(&self.file).wrap_err("failed to remap file after grow")? };

        self.len = new_len;

        Ok(())
    }

    pub fn bytes(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let end = offset + len as u64;
        ensure!(
            end <= self.len,
            "byte range {}..{} out of bounds (file length {})",
            offset,
            end,
            self.len
        );
        Ok(&self.mmap[offset as usize..end as usize])
    }

    pub fn bytes_mut(&mut self, offset: u64, len: usize) -> Result<&mut [u8]> {
        let end = offset + len as u64;
        ensure!(
            end <= self.len,
            "byte range {}..{} out of bounds (file length {})",
            offset,
            end,
            self.len
        );
        Ok(&mut self.mmap[offset as usize..end as usize])
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().wrap_err("failed to sync mapping to disk")
    }
}
