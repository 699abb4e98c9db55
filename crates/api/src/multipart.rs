//! `multipart/form-data` field extraction.
//!
//! Text fields are JSON-decoded when they parse (so `"42"` becomes a number
//! and `"{\"a\":1}"` an object) and kept as raw strings otherwise. Parts
//! carrying a file name are collected as [`UploadedFile`]s.

use axum::body::Bytes;
use axum::extract::Multipart;
use serde_json::{Map, Value};

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

impl FormData {
    /// Add a text field. Repeated names collect into an array.
    pub fn insert_text(&mut self, name: &str, raw: &str) {
        let value = coerce_field(raw);
        match self.fields.get_mut(name) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    pub fn into_value(self) -> (Value, Vec<UploadedFile>) {
        (Value::Object(self.fields), self.files)
    }
}

/// Decode a text field opportunistically; fall back to the raw string.
pub fn coerce_field(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn extract_form_fields(mut multipart: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                bytes,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.insert_text(&name, &text);
        }
    }

    Ok(form)
}
