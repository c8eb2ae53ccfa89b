//! Disk-backed evidence store for uploaded report attachments.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use arx_core::{current_unix_timestamp_ms, write_bytes_atomic};

#[derive(Debug, Clone)]
/// Flat directory of uploads named by receive time + original extension.
pub struct EvidenceStore {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A stored upload: its disk path and the name it is served under.
pub struct StoredEvidence {
    pub path: PathBuf,
    pub file_name: String,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores one upload atomically. Same-millisecond uploads bump the
    /// timestamp until a free name is found.
    pub fn store(&self, original_name: &str, bytes: &[u8]) -> Result<StoredEvidence> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let mut stamp = current_unix_timestamp_ms();
        let (file_name, path) = loop {
            let candidate = format!("{stamp}{extension}");
            let candidate_path = self.root.join(&candidate);
            if !candidate_path.exists() {
                break (candidate, candidate_path);
            }
            stamp = stamp.saturating_add(1);
        };

        write_bytes_atomic(&path, bytes)?;
        Ok(StoredEvidence { path, file_name })
    }

    /// Reads a previously stored upload by its served name. Only flat
    /// names are accepted; anything that could escape the root is refused.
    pub fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let file_name = file_name.trim();
        if file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            bail!("invalid evidence file name '{file_name}'");
        }
        let path = self.root.join(file_name);
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }
}

/// Minimal content-type mapping for the static uploads route.
pub fn content_type_for(file_name: &str) -> &'static str {
    match Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_store_keeps_original_extension_and_round_trips() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::new(tempdir.path()).expect("store");
        let stored = store.store("screenshot.PNG", b"png bytes").expect("store");
        assert!(stored.file_name.ends_with(".PNG"));
        assert_eq!(store.read(&stored.file_name).expect("read"), b"png bytes");
    }

    #[test]
    fn regression_same_millisecond_uploads_get_distinct_names() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::new(tempdir.path()).expect("store");
        let first = store.store("a.png", b"one").expect("first");
        let second = store.store("b.png", b"two").expect("second");
        assert_ne!(first.file_name, second.file_name);
        assert_eq!(store.read(&second.file_name).expect("read"), b"two");
    }

    #[test]
    fn regression_read_refuses_traversal_and_hidden_names() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = EvidenceStore::new(tempdir.path()).expect("store");
        assert!(store.read("../secret").is_err());
        assert!(store.read("a/../../secret").is_err());
        assert!(store.read(".hidden").is_err());
        assert!(store.read("").is_err());
        assert!(store.read("sub/dir.png").is_err());
    }

    #[test]
    fn unit_content_type_for_maps_common_extensions() {
        assert_eq!(content_type_for("1700.png"), "image/png");
        assert_eq!(content_type_for("1700.JPG"), "image/jpeg");
        assert_eq!(content_type_for("1700"), "application/octet-stream");
    }
}
