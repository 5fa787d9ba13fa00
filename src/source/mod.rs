//
// Copyright (c) 2025 Nathan Fiedler
//

//! Read-only memory mapped byte source.
//!
//! Chunking a multi-gigabyte file through a mapping avoids copying it into
//! memory. The mapping must not be modified by anyone while it is in use;
//! changing the file underneath a scan is undefined behavior.
use crate::error::Result;
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

///
/// A file mapped read-only into memory.
///
/// Zero length files cannot be mapped on every platform, so they are
/// represented without a mapping and yield an empty slice.
///
#[derive(Debug)]
pub struct MappedFile {
    map: Option<Mmap>,
}

impl MappedFile {
    /// Open and map the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::map(&file)
    }

    /// Map an already opened file.
    pub fn map(file: &File) -> Result<Self> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self { map: None });
        }
        // the mapping is only read, and callers must not modify the file
        // while it is mapped
        let map = unsafe { Mmap::map(file)? };
        debug!("mapped {} bytes", map.len());
        Ok(Self { map: Some(map) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_none()
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for MappedFile {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello, mapped world").unwrap();
        file.flush().unwrap();
        let mapped = MappedFile::open(file.path()).unwrap();
        assert_eq!(mapped.len(), 19);
        assert_eq!(&mapped[..5], b"hello");
        assert!(!mapped.is_empty());
    }

    #[test]
    fn test_map_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mapped = MappedFile::open(file.path()).unwrap();
        assert!(mapped.is_empty());
        assert_eq!(mapped.as_bytes(), b"");
    }

    #[test]
    fn test_map_missing_file() {
        assert!(MappedFile::open("/no/such/file").is_err());
    }
}
