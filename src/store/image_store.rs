use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// The flat directory of mirrored listing photos.
///
/// Files are named `{listing_key}-{index}.{ext}` with indices contiguous
/// from 0 and index 0 holding the preferred photo. Listing keys may contain
/// `-` themselves, so the index is parsed from the right.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating image directory {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn asset_file_name(key: &str, index: usize, ext: &str) -> String {
        format!("{}-{}.{}", key, index, ext)
    }

    pub fn asset_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// The listing key encoded in an asset file name, if it is one.
    pub fn parse_listing_key(file_name: &str) -> Option<&str> {
        let stem = file_name.rsplit_once('.').map(|(s, _)| s)?;
        let (key, index) = stem.rsplit_once('-')?;
        if key.is_empty() || index.parse::<u32>().is_err() {
            return None;
        }
        Some(key)
    }

    /// All listing keys that have at least one image on disk.
    pub fn local_keys(&self) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for entry in self.read_dir()? {
            if let Some(key) = Self::parse_listing_key(&entry) {
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }

    /// File names of one listing's images.
    pub fn files_for(&self, key: &str) -> Result<Vec<String>> {
        let prefix = format!("{}-", key);
        let mut files: Vec<String> = self
            .read_dir()?
            .into_iter()
            .filter(|name| {
                name.starts_with(&prefix) && Self::parse_listing_key(name) == Some(key)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn photo_count(&self, key: &str) -> Result<usize> {
        Ok(self.files_for(key)?.len())
    }

    pub fn has_any(&self, key: &str) -> Result<bool> {
        Ok(!self.files_for(key)?.is_empty())
    }

    /// Remove every image of one listing. Returns how many files went away.
    pub fn remove_listing(&self, key: &str) -> Result<usize> {
        let files = self.files_for(key)?;
        let mut removed = 0;
        for name in files {
            let path = self.dir.join(&name);
            std::fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn write_asset(&self, key: &str, index: usize, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.asset_path(&Self::asset_file_name(key, index, ext));
        std::fs::write(&path, bytes).with_context(|| format!("writing {:?}", path))?;
        Ok(path)
    }

    pub fn total_files(&self) -> Result<usize> {
        Ok(self.read_dir()?.len())
    }

    fn read_dir(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("reading image directory {:?}", self.dir))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}
