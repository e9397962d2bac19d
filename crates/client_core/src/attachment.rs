use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use shared::{
    domain::Attachment,
    error::{ChatError, MAX_ATTACHMENT_BYTES},
};

const FALLBACK_MIME: &str = "application/octet-stream";

/// A resource staged for inline transport: metadata is probed up
/// front so the size gate can run before any content I/O.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    path: PathBuf,
}

impl PendingUpload {
    pub async fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = guess_mime(&filename).map(str::to_string);
        Ok(Self {
            filename,
            mime_type,
            size_bytes: metadata.len(),
            path,
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Encodes the upload into a self-contained inline attachment.
///
/// Rejects before reading anything when the declared size exceeds the
/// 1 MiB limit; on rejection no message is sent and no state is
/// mutated. The asynchronous content read is this component's only
/// suspension point. Resources with an `image/*` MIME classify as
/// `Image`, everything else as `File`; the original filename is always
/// carried.
pub async fn encode(upload: &PendingUpload) -> Result<Attachment, ChatError> {
    if upload.size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(ChatError::AttachmentTooLarge {
            size_bytes: upload.size_bytes,
        });
    }

    let bytes = tokio::fs::read(&upload.path)
        .await
        .map_err(|err| ChatError::AttachmentUnreadable {
            reason: err.to_string(),
        })?;

    let mime = upload.mime_type.as_deref().unwrap_or(FALLBACK_MIME);
    let url = format!("data:{mime};base64,{}", STANDARD.encode(&bytes));
    let name = upload.filename.clone();

    Ok(if mime.starts_with("image/") {
        Attachment::Image { url, name }
    } else {
        Attachment::File { url, name }
    })
}

/// Content placeholder used when a message exists only to carry an
/// attachment.
pub fn placeholder_text(attachment: &Attachment) -> &'static str {
    match attachment {
        Attachment::Image { .. } => "Sent a photo",
        Attachment::File { .. } => "Sent a file",
    }
}

fn guess_mime(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename).extension()?.to_str()?;
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/attachment_tests.rs"]
mod tests;
