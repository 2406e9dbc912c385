//! Attachment intake: turns uploaded files into stored blobs and the
//! `AttachmentRef`s an order keeps.

use std::sync::Arc;

use common::FileId;
use domain::AttachmentRef;
use futures_util::future::join_all;
use thiserror::Error;

use crate::services::blob::{Blob, BlobError, BlobMetadata, BlobStore};

pub const DEFAULT_FILENAME: &str = "attachment";
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file received with an order request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: Some(filename.into()),
            mime_type: Some(mime_type.into()),
            data: data.into(),
        }
    }
}

/// Errors from attachment intake.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Storing one of the files failed; nothing from the batch was kept.
    #[error("Failed to store attachment '{filename}': {source}")]
    Write {
        filename: String,
        #[source]
        source: BlobError,
    },
}

/// Strips any client-side directory from a filename.
fn clean_filename(raw: Option<&str>) -> String {
    raw.and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILENAME)
        .to_string()
}

fn clean_mime_type(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

/// Stores uploaded files all-or-nothing.
#[derive(Clone)]
pub struct AttachmentIntake {
    blobs: Arc<dyn BlobStore>,
}

impl AttachmentIntake {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Writes every file concurrently and waits for all of them.
    ///
    /// If any write fails, the blobs that did get written are deleted and the
    /// first failure is returned.
    #[tracing::instrument(skip(self, files), fields(count = files.len()))]
    pub async fn store(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<AttachmentRef>, AttachmentError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let refs: Vec<AttachmentRef> = files
            .iter()
            .map(|file| AttachmentRef {
                file_id: FileId::new(),
                filename: clean_filename(file.filename.as_deref()),
                mime_type: clean_mime_type(file.mime_type.as_deref()),
                size: file.data.len() as u64,
            })
            .collect();

        let writes = refs.iter().zip(files).map(|(attachment, file)| {
            let metadata = BlobMetadata {
                filename: attachment.filename.clone(),
                mime_type: attachment.mime_type.clone(),
                size: attachment.size,
            };
            self.blobs.put(attachment.file_id, metadata, file.data)
        });
        let results = join_all(writes).await;

        let mut first_error = None;
        let mut written = Vec::new();
        for (attachment, result) in refs.iter().zip(results) {
            match result {
                Ok(()) => written.push(attachment.clone()),
                Err(source) if first_error.is_none() => {
                    first_error = Some(AttachmentError::Write {
                        filename: attachment.filename.clone(),
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(filename = %attachment.filename, error = %e, "attachment write failed");
                }
            }
        }

        if let Some(error) = first_error {
            tracing::warn!(error = %error, rolled_back = written.len(), "attachment batch failed");
            self.discard(&written).await;
            return Err(error);
        }

        let bytes: u64 = refs.iter().map(|a| a.size).sum();
        metrics::counter!("attachment_bytes_total").increment(bytes);
        Ok(refs)
    }

    /// Deletes stored attachments. Failures are logged, not returned.
    pub async fn discard(&self, attachments: &[AttachmentRef]) {
        let deletes = attachments.iter().map(|a| self.blobs.delete(a.file_id));
        for (attachment, result) in attachments.iter().zip(join_all(deletes).await) {
            if let Err(e) = result {
                tracing::warn!(
                    file_id = %attachment.file_id,
                    error = %e,
                    "failed to delete orphaned attachment"
                );
            }
        }
    }

    /// Loads a stored attachment.
    pub async fn open(&self, file_id: FileId) -> Result<Blob, BlobError> {
        self.blobs.get(file_id).await
    }
}
