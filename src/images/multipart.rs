use std::collections::HashMap;

use axum::extract::Multipart;
use tracing::warn;

use super::services::UploadItem;
use crate::error::AppError;

/// Text fields and file parts of a multipart body, keyed by field name.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadItem>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = mp.next_field().await.map_err(|e| {
            warn!(error = %e, "malformed multipart body");
            AppError::validation("Malformed multipart body")
        })? {
            let Some(name) = field.name().map(|s| s.trim_end_matches("[]").to_string()) else {
                continue;
            };
            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::validation("Could not read uploaded file"))?;
                if body.is_empty() {
                    continue;
                }
                form.files.insert(name, UploadItem { body, content_type });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|_| AppError::validation("Could not read form field"))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    pub fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }

    pub fn file(&mut self, name: &str) -> Option<UploadItem> {
        self.files.remove(name)
    }
}
