use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Hard cap applied to every upload field.
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid file name: {0}")]
    InvalidName(String),
    #[error("path escapes the upload root: {0}")]
    PathEscape(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An uploaded file, fully read into memory before validation. The 2MB cap
/// keeps this cheap.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Per-field acceptance rule: allowed extensions plus a byte ceiling.
#[derive(Debug, Clone, Copy)]
pub struct UploadRule {
    pub allowed: &'static [&'static str],
    pub max_bytes: usize,
}

impl UploadRule {
    pub const fn new(allowed: &'static [&'static str]) -> Self {
        Self {
            allowed,
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    /// Field-level validation, run before any file or database write.
    pub fn check(&self, field: &str, payload: &FilePayload) -> Result<(), String> {
        if payload.bytes.is_empty() {
            return Err(format!("{}: file is empty", field));
        }
        if payload.bytes.len() > self.max_bytes {
            return Err(format!(
                "{}: file exceeds {} KB",
                field,
                self.max_bytes / 1024
            ));
        }
        let ext = payload
            .extension()
            .ok_or_else(|| format!("{}: file has no extension", field))?;
        if !self.allowed.contains(&ext.as_str()) {
            return Err(format!(
                "{}: file type .{} not allowed (expected one of: {})",
                field,
                ext,
                self.allowed.join(", ")
            ));
        }
        Ok(())
    }
}

/// Observation approval document (SKTL).
pub const SKTL_RULE: UploadRule = UploadRule::new(&["pdf", "jpg", "jpeg", "png"]);
/// Documentation photos.
pub const PHOTO_RULE: UploadRule = UploadRule::new(&["jpg", "jpeg", "png"]);
/// Handover SKTL and third-party contracts.
pub const PDF_RULE: UploadRule = UploadRule::new(&["pdf"]);
/// Completion reports (berita acara).
pub const REPORT_RULE: UploadRule = UploadRule::new(&["pdf", "doc", "docx"]);

/// Storage seam for uploaded artifacts. Stored paths are relative strings
/// persisted in the database and resolved to public URLs at render time.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Writes the bytes under `category` and returns the stored relative path.
    async fn store(
        &self,
        category: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError>;

    /// Removes a previously stored file. Missing files are not an error; the
    /// database row may outlive the file after a partial failure.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Local-disk store rooted at the configured upload directory.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(relative);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::PathEscape(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        category: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let sanitized = sanitize_file_name(original_name)
            .ok_or_else(|| StoreError::InvalidName(original_name.to_string()))?;
        let relative = format!("{}/{}_{}", category, Uuid::new_v4().simple(), sanitized);
        let full = self.resolve(&relative)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(relative)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// Returns `None` when nothing usable remains.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = Path::new(name).file_name()?.to_str()?;
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolves a stored relative path against the public base, e.g. `/uploads`.
pub fn public_url(base: &str, stored_path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        stored_path.trim_start_matches('/')
    )
}
