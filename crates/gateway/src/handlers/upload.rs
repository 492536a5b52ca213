//! File upload handlers
//!
//! `POST /upload` stores the file and indexes it into the knowledge base.
//! `POST /upload/ask-instant` answers a question about the file without
//! storing or indexing anything.

use crate::storage::StoredFile;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use ragforge_common::errors::{AppError, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Extensions accepted by both upload endpoints
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "txt", "csv"];

const FILE_FIELD: &str = "file";
const MESSAGE_FIELD: &str = "message";

/// The `file` part of a multipart request
#[derive(Debug)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Reject empty, oversized or unsupported uploads
pub fn validate_upload(file: &UploadedFile, max_bytes: usize) -> Result<()> {
    if file.bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge {
            size: file.bytes.len(),
            limit: max_bytes,
        });
    }

    let extension = file
        .name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(AppError::UnsupportedMedia {
            name: file.name.clone(),
        }),
    }
}

struct UploadForm {
    file: Option<UploadedFile>,
    message: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm {
        file: None,
        message: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some(FILE_FIELD) => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(UploadedFile {
                    name,
                    content_type,
                    bytes,
                });
            }
            Some(MESSAGE_FIELD) => {
                form.message = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation(format!("invalid multipart body: {}", err), None)
}

fn require_file(form: &mut UploadForm, max_bytes: usize) -> Result<UploadedFile> {
    let file = form
        .file
        .take()
        .ok_or_else(|| AppError::validation("multipart field 'file' is required", Some(FILE_FIELD)))?;
    validate_upload(&file, max_bytes)?;
    Ok(file)
}

#[derive(Debug, Serialize)]
pub struct UploadData {
    pub original_name: String,
    pub mimetype: Option<String>,
    pub size: String,
    pub location: String,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub data: UploadData,
}

/// Store a file and index it into the knowledge base
///
/// A storage failure fails the request. An indexing failure is reported
/// as `indexed: false` and the upload still succeeds.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut form = read_form(multipart).await?;
    let file = require_file(&mut form, state.config.server.max_upload_bytes)?;

    info!(name = %file.name, bytes = file.bytes.len(), "Processing uploaded file");

    let stored = state.storage.save(&file.bytes, &file.name).await?;

    let outcome = match &stored {
        StoredFile::Local(path) => state.orchestrator.process_document(path).await,
        StoredFile::Remote(uri) => {
            state
                .orchestrator
                .process_stored_bytes(&file.bytes, &file.name, uri)
                .await
        }
    };

    let (indexed, total_chunks, index_error) = match outcome {
        Ok(summary) => (true, Some(summary.total_chunks), None),
        Err(e) => {
            warn!(name = %file.name, location = %stored.location(), error = %e, "Upload stored but not indexed");
            (false, None, Some(e.to_string()))
        }
    };

    let message = if indexed {
        "File uploaded and indexed into the knowledge base"
    } else {
        "File uploaded but could not be indexed"
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: message.to_string(),
            data: UploadData {
                original_name: file.name,
                mimetype: file.content_type,
                size: format!("{:.2} KB", file.bytes.len() as f64 / 1024.0),
                location: stored.location(),
                indexed,
                total_chunks,
                index_error,
            },
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct InstantAnswerData {
    pub file_name: String,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct InstantAnswerResponse {
    pub message: String,
    pub data: InstantAnswerData,
}

/// Answer a question about the uploaded file only; nothing is persisted
pub async fn ask_instant(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<InstantAnswerResponse>> {
    let mut form = read_form(multipart).await?;
    let file = require_file(&mut form, state.config.server.max_upload_bytes)?;
    let question = form
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::validation("multipart field 'message' is required", Some(MESSAGE_FIELD)))?;

    let answer = state
        .orchestrator
        .answer_ephemeral_question(&file.bytes, &file.name, &question)
        .await?;

    Ok(Json(InstantAnswerResponse {
        message: "Answer generated from the in-memory document".to_string(),
        data: InstantAnswerData {
            file_name: file.name,
            question,
            answer,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, len: usize) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            content_type: None,
            bytes: Bytes::from(vec![b'a'; len]),
        }
    }

    #[test]
    fn test_accepts_allowed_extensions_case_insensitively() {
        for name in ["a.pdf", "b.PNG", "c.jpeg", "d.Txt", "e.csv", "f.jpg"] {
            assert!(validate_upload(&upload(name, 10), 100).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        for name in ["setup.exe", "archive.tar.gz", "no_extension"] {
            let err = validate_upload(&upload(name, 10), 100).unwrap_err();
            assert!(matches!(err, AppError::UnsupportedMedia { .. }), "{}", name);
            assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[test]
    fn test_rejects_oversized_upload() {
        assert!(validate_upload(&upload("a.txt", 100), 100).is_ok());
        let err = validate_upload(&upload("a.txt", 101), 100).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { size: 101, limit: 100 }));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
