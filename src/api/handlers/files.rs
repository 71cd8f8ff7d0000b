use crate::AppState;
use crate::api::error::AppError;
use crate::entities::file_records;
use crate::services::blob_store::StagedBlob;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::ToSchema;

/// Public shape of a stored file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub original_name: String,
    /// Internal blob key; the file is also reachable at `/uploads/{filename}`.
    pub filename: String,
    pub size: i64,
    pub upload_time: DateTime<Utc>,
}

impl From<file_records::Model> for FileRecord {
    fn from(model: file_records::Model) -> Self {
        Self {
            id: model.id,
            original_name: model.original_name,
            filename: model.stored_name,
            size: model.size,
            upload_time: model.upload_time,
        }
    }
}

/// Multipart body accepted by the upload route (documentation only).
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub file: FileRecord,
}

#[utoipa::path(
    post,
    path = "/api/files/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File uploaded", body = UploadResponse),
        (status = 400, description = "No file uploaded"),
        (status = 413, description = "Payload too large")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut staged: Vec<(StagedBlob, String)> = Vec::new();

    let result: Result<(), AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(e.body_text())
            }
        })? {
            if field.name() != Some("file") {
                // Unrelated form fields are read off the wire and ignored
                let _ = field.bytes().await;
                continue;
            }

            let original_name = field
                .file_name()
                .filter(|n| !n.is_empty())
                .unwrap_or("unnamed")
                .to_string();

            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            let blob = state.file_service.upload_to_staging(reader).await?;
            staged.push((blob, original_name));
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
        for (blob, _) in staged {
            state.file_service.discard(blob).await;
        }
        return Err(e);
    }

    if staged.len() > 1 {
        for (blob, _) in staged {
            state.file_service.discard(blob).await;
        }
        return Err(AppError::BadRequest(
            "Only one file may be uploaded per request".to_string(),
        ));
    }

    let (blob, original_name) = staged
        .pop()
        .ok_or(AppError::BadRequest("No file uploaded".to_string()))?;

    let record = state
        .file_service
        .process_upload(blob, original_name)
        .await?;

    Ok(Json(UploadResponse {
        message: "File uploaded".to_string(),
        file: record.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/files",
    responses(
        (status = 200, description = "All files, newest first", body = Vec<FileRecord>)
    ),
    tag = "files"
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileRecord>>, AppError> {
    let files = state.file_service.list_files().await?;
    Ok(Json(files.into_iter().map(FileRecord::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/download",
    params(
        ("id" = String, Path, description = "File record ID")
    ),
    responses(
        (status = 200, description = "File content stream"),
        (status = 404, description = "File not found, or file missing on server")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    let (record, blob) = state.file_service.open_download(&file_id).await?;

    let (content_type, content_disposition) = resolve_file_headers(&record.original_name);

    tracing::info!(
        "📎 Download id={} as '{}' ({} bytes)",
        record.id,
        record.original_name,
        blob.size
    );

    let body = Body::from_stream(ReaderStream::new(blob.reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, blob.size)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// Content-Type guessed from the extension, and an attachment disposition
/// that suggests `filename` with an ASCII fallback plus the RFC 5987 form.
pub(crate) fn resolve_file_headers(filename: &str) -> (String, String) {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let content_type = match extension.as_str() {
        "txt" | "log" | "md" => mime::TEXT_PLAIN_UTF_8.to_string(),
        "csv" => mime::TEXT_CSV.to_string(),
        "html" | "htm" => mime::TEXT_HTML.to_string(),
        "json" => mime::APPLICATION_JSON.to_string(),
        "pdf" => mime::APPLICATION_PDF.to_string(),
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "gif" => mime::IMAGE_GIF.to_string(),
        "svg" => mime::IMAGE_SVG.to_string(),
        "webp" => "image/webp".to_string(),
        "mp4" => "video/mp4".to_string(),
        "webm" => "video/webm".to_string(),
        "mp3" => "audio/mpeg".to_string(),
        "wav" => "audio/wav".to_string(),
        "zip" => "application/zip".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    };

    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.trim().is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    let content_disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    );

    (content_type, content_disposition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_for_plain_name() {
        let (ct, cd) = resolve_file_headers("report.pdf");
        assert_eq!(ct, "application/pdf");
        assert_eq!(
            cd,
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report%2Epdf"
        );
    }

    #[test]
    fn test_headers_for_unicode_name() {
        let (ct, cd) = resolve_file_headers("日本.bin");
        assert_eq!(ct, "application/octet-stream");
        assert!(cd.contains("filename=\".bin\""));
        assert!(cd.contains("filename*=UTF-8''%E6%97%A5%E6%9C%AC%2Ebin"));
    }

    #[test]
    fn test_headers_strip_quotes_from_fallback() {
        let (_, cd) = resolve_file_headers("a\"b;c.txt");
        assert!(cd.starts_with("attachment; filename=\"abc.txt\""));
    }

    #[test]
    fn test_record_json_shape() {
        let record = FileRecord::from(file_records::Model {
            id: "abc".into(),
            original_name: "cat.png".into(),
            stored_name: "1-2-cat.png".into(),
            size: 42,
            upload_time: Utc::now(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["originalName"], "cat.png");
        assert_eq!(json["filename"], "1-2-cat.png");
        assert_eq!(json["size"], 42);
        assert!(json["uploadTime"].is_string());
    }
}
