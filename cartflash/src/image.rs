//! Source images.
//!
//! An image is the raw byte content of the whole flash chip, so its length
//! has to match the profile exactly. Anything shorter would leave the tail
//! of the cartridge erased.

use {
    crate::{
        error::{Error, Result},
        target::DeviceProfile,
    },
    log::debug,
    std::{fs, io, path::Path},
};

/// Immutable flash image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    data: Vec<u8>,
}

impl SourceImage {
    /// Wrap an in-memory buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Read an image from disk.
    ///
    /// A missing or unreadable file is reported as [`Error::Image`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Error::Image(format!("file '{}' was not found", path.display()))
            },
            _ => Error::Image(format!("cannot read '{}': {e}", path.display())),
        })?;
        debug!("Loaded {} ({} bytes)", path.display(), data.len());
        Ok(Self { data })
    }

    /// Read an image from disk and check it against `profile`.
    pub fn load_for<P: AsRef<Path>>(path: P, profile: &DeviceProfile) -> Result<Self> {
        let image = Self::from_file(path)?;
        image.validate(profile)?;
        Ok(image)
    }

    /// Check that the image covers exactly the profile's flash size.
    pub fn validate(&self, profile: &DeviceProfile) -> Result<()> {
        let expected = u64::from(profile.total_size());
        let actual = self.data.len() as u64;
        if actual == expected {
            Ok(())
        } else {
            Err(Error::Image(format!(
                "image is {actual} bytes but the cartridge holds exactly {expected} bytes"
            )))
        }
    }

    /// Image contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for SourceImage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::CartProfile;

    #[test]
    fn test_validate_exact_size() {
        let profile = CartProfile::Cart8K.device_profile();
        let image = SourceImage::from_bytes(vec![0xFF; 262_144]);
        assert!(image.validate(&profile).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_and_long() {
        let profile = CartProfile::Cart8K.device_profile();
        for len in [0, 1, 262_143, 262_145, 524_288] {
            let image = SourceImage::from_bytes(vec![0; len]);
            assert!(
                matches!(image.validate(&profile), Err(Error::Image(_))),
                "length {len} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_file_is_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_image.bin");
        match SourceImage::from_file(&path) {
            Err(Error::Image(msg)) => assert!(msg.contains("not found")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_load_for_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multicart.bin");
        let profile = DeviceProfile::new(16, 4).unwrap();

        fs::write(&path, [0x5Au8; 64]).unwrap();
        let image = SourceImage::load_for(&path, &profile).unwrap();
        assert_eq!(image.len(), 64);
        assert!(image
            .as_bytes()
            .iter()
            .all(|&b| b == 0x5A));

        fs::write(&path, [0u8; 10]).unwrap();
        assert!(SourceImage::load_for(&path, &profile).is_err());
    }
}
