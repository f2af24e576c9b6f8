use axum::body::Bytes;
use axum::extract::Multipart;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ErrorMessage, HttpError};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const PROFILE_PICTURES_DIR: &str = "profile_pics";
pub const BLOG_IMAGES_DIR: &str = "blog_images";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Text fields and files of a `multipart/form-data` submission
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Drain a multipart body. Empty file parts (no file chosen) are ignored.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, HttpError> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            tracing::error!("Multipart error: {}", e);
            HttpError::new(e.body_text(), e.status())
        })? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if let Some(file_name) = field.file_name().map(str::to_string) {
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read upload bytes: {}", e);
                    HttpError::bad_request("Failed to read file data")
                })?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    form.files.insert(name, UploadedFile { file_name, bytes });
                }
            } else {
                let value = field.text().await.map_err(|e| {
                    tracing::error!("Failed to read form field: {}", e);
                    HttpError::bad_request(ErrorMessage::InvalidForm.to_string())
                })?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    #[cfg(test)]
    pub fn with_fields(fields: &[(&str, &str)]) -> Self {
        FormData {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }

    /// Trimmed text value, empty when absent
    pub fn text(&self, name: &str) -> String {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    /// Trimmed text value, `None` when absent or blank
    pub fn optional(&self, name: &str) -> Option<String> {
        let value = self.text(name);
        if value.is_empty() { None } else { Some(value) }
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

/// MIME type from the file signature, `None` for anything but JPEG/PNG/GIF/WebP
pub fn detect_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        _ => "webp",
    }
}

/// Check an upload without touching the disk; returns the stored extension
pub fn validate_image(field: &str, file: &UploadedFile) -> Result<&'static str, HttpError> {
    let original_ext = file
        .file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
        return Err(HttpError::field(
            field,
            "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF.",
        ));
    }

    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(HttpError::field(field, "File too large. Maximum size is 5MB."));
    }

    match detect_image_type(&file.bytes) {
        Some(mime) => Ok(extension_for(mime)),
        None => Err(HttpError::field(
            field,
            "File content does not match an allowed image type.",
        )),
    }
}

/// Write a validated image under `media_root/subdir` with a random name.
/// Returns the path relative to `media_root`, which is what the row stores.
pub async fn save_image(
    media_root: &str,
    subdir: &str,
    field: &str,
    file: &UploadedFile,
) -> Result<String, HttpError> {
    let ext = validate_image(field, file)?;

    let dir = PathBuf::from(media_root).join(subdir);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        tracing::error!("Failed to create media directory {:?}: {}", dir, e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    let file_name = format!("{}.{}", Uuid::new_v4(), ext);
    tokio::fs::write(dir.join(&file_name), &file.bytes)
        .await
        .map_err(|e| {
            tracing::error!("Failed to write upload {}: {}", file_name, e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let relative = format!("{}/{}", subdir, file_name);
    tracing::info!(path = %relative, size = file.bytes.len(), "Image stored");
    Ok(relative)
}

/// Delete a stored image (by the relative path `save_image` returned) whose
/// record could not be written. Failures are only logged.
pub async fn remove_image(media_root: &str, relative: &str) {
    let path = PathBuf::from(media_root).join(relative);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::info!(path = %relative, "Orphaned image removed"),
        Err(e) => tracing::warn!("Failed to remove orphaned image {:?}: {}", path, e),
    }
}
