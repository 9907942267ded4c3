//! Raw images are flat little-endian instruction streams with no header.
//! The whole file is copied to a page-aligned guest base address.

use std::fs;
use std::path::{Path, PathBuf};

use arm64_core::{FaultReason, MemoryError, MemoryManager, PAGE_SIZE};
use thiserror::Error;

/// Failures while reading or placing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The image file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The image holds no instructions.
    #[error("image is empty")]
    Empty,
    /// The image length is not a whole number of instruction words.
    #[error("image length {0} is not a multiple of 4")]
    TruncatedInstruction(usize),
    /// The base address is not page aligned.
    #[error("base address {0:#x} is not page aligned")]
    UnalignedBase(u64),
    /// Mapping the image range failed.
    #[error(transparent)]
    Map(#[from] MemoryError),
    /// Copying the image into guest memory faulted.
    #[error("copying image faulted: {0}")]
    Copy(#[from] FaultReason),
}

/// A validated raw image and the guest address it loads at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestImage {
    base: u64,
    bytes: Vec<u8>,
}

impl GuestImage {
    /// Validates `bytes` for loading at `base`.
    ///
    /// # Errors
    ///
    /// Rejects empty images, images with a partial trailing word, and bases
    /// that are not page aligned.
    pub fn from_bytes(base: u64, bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if bytes.len() % 4 != 0 {
            return Err(ImageError::TruncatedInstruction(bytes.len()));
        }
        if base % PAGE_SIZE != 0 {
            return Err(ImageError::UnalignedBase(base));
        }
        Ok(Self { base, bytes })
    }

    /// Reads and validates the image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Io`] when the file cannot be read, otherwise the
    /// validation errors of [`Self::from_bytes`].
    pub fn read(path: &Path, base: u64) -> Result<Self, ImageError> {
        let bytes = fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(base, bytes)
    }

    /// Guest load address.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Image length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Always `false`; empty images are rejected on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Image length rounded up to whole guest pages.
    #[must_use]
    pub fn mapped_size(&self) -> u64 {
        self.len().div_ceil(PAGE_SIZE) * PAGE_SIZE
    }

    /// Maps the image range onto guest RAM at `pa` and copies the image in.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Map`] when the range cannot be mapped and
    /// [`ImageError::Copy`] when the copy faults.
    pub fn load_into(&self, memory: &MemoryManager, pa: u64) -> Result<(), ImageError> {
        memory.map(self.base, pa, self.mapped_size())?;
        memory.write_bytes(self.base, &self.bytes)?;
        tracing::debug!(
            base = self.base,
            pa,
            len = self.bytes.len(),
            "loaded guest image"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use arm64_core::{MemoryConfig, MemoryManager};

    use super::{GuestImage, ImageError};

    #[test]
    fn rejects_partial_words_and_unaligned_bases() {
        assert!(matches!(
            GuestImage::from_bytes(0x1000, vec![0; 6]),
            Err(ImageError::TruncatedInstruction(6))
        ));
        assert!(matches!(
            GuestImage::from_bytes(0x1004, vec![0; 4]),
            Err(ImageError::UnalignedBase(0x1004))
        ));
        assert!(matches!(
            GuestImage::from_bytes(0x1000, Vec::new()),
            Err(ImageError::Empty)
        ));
    }

    #[test]
    fn mapped_size_rounds_to_pages() {
        let image = GuestImage::from_bytes(0x1000, vec![0; 0x1004]).expect("valid");
        assert_eq!(image.mapped_size(), 0x2000);
        assert_eq!(image.len(), 0x1004);
        assert!(!image.is_empty());
    }

    #[test]
    fn load_copies_words_to_the_base() {
        let memory = MemoryManager::with_ram_size(0x4000, &MemoryConfig::default()).expect("ram");
        let image =
            GuestImage::from_bytes(0x10000, 0xD65F_03C0u32.to_le_bytes().to_vec()).expect("valid");
        image.load_into(&memory, 0x1000).expect("load");
        assert_eq!(memory.read_u32(0x10000), Ok(0xD65F_03C0));
        assert_eq!(memory.physical_address(0x10000), Ok(0x1000));
    }

    #[test]
    fn read_reports_missing_files_with_their_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.bin");
        match GuestImage::read(&missing, 0) {
            Err(ImageError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }

        let present = dir.path().join("ret.bin");
        let mut file = std::fs::File::create(&present).expect("create");
        file.write_all(&0xD65F_03C0u32.to_le_bytes()).expect("write");
        let image = GuestImage::read(&present, 0x2000).expect("read");
        assert_eq!(image.base(), 0x2000);
    }
}
