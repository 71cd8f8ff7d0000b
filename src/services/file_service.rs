use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::blob_store::{BlobReader, BlobStore, StagedBlob};
use crate::utils::naming::generate_stored_name;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tokio::io::AsyncRead;
use uuid::Uuid;

pub struct FileService {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
}

impl FileService {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    pub async fn upload_to_staging<'a>(
        &self,
        reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<StagedBlob, AppError> {
        self.blobs.stage(Box::new(reader)).await.map_err(|e| {
            // Client disconnects and multipart framing errors surface here
            let multipart_status = e
                .downcast_ref::<std::io::Error>()
                .and_then(|io| io.get_ref())
                .and_then(|inner| inner.downcast_ref::<MultipartError>())
                .map(MultipartError::status);

            match multipart_status {
                Some(StatusCode::PAYLOAD_TOO_LARGE) => AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                ),
                Some(_) => AppError::BadRequest(format!("Failed to read upload: {}", e)),
                None => AppError::Internal(format!("Failed to stage upload: {}", e)),
            }
        })
    }

    pub async fn discard(&self, staged: StagedBlob) {
        let path = staged.path.clone();
        if let Err(e) = self.blobs.discard(staged).await {
            tracing::warn!("Failed to discard staged upload {}: {}", path.display(), e);
        }
    }

    async fn rollback(txn: DatabaseTransaction) {
        if let Err(e) = txn.rollback().await {
            tracing::warn!("Failed to roll back upload transaction: {}", e);
        }
    }

    /// Persist the record and publish the staged blob as one unit.
    ///
    /// The record insert and the blob rename happen inside one transaction; the
    /// commit comes last, so a failure at any step leaves neither a record nor
    /// a visible blob behind.
    pub async fn process_upload(
        &self,
        staged: StagedBlob,
        original_name: String,
    ) -> Result<file_records::Model, AppError> {
        let record = file_records::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            stored_name: Set(generate_stored_name(&original_name)),
            original_name: Set(original_name),
            size: Set(staged.size),
            upload_time: Set(Utc::now()),
        };

        let txn = match self.db.begin().await {
            Ok(txn) => txn,
            Err(e) => {
                self.discard(staged).await;
                return Err(e.into());
            }
        };

        let model = match record.insert(&txn).await {
            Ok(model) => model,
            Err(e) => {
                Self::rollback(txn).await;
                self.discard(staged).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.blobs.publish(&staged, &model.stored_name).await {
            Self::rollback(txn).await;
            self.discard(staged).await;
            return Err(AppError::Internal(format!("Failed to publish blob: {}", e)));
        }

        if let Err(e) = txn.commit().await {
            if let Err(rm) = self.blobs.remove(&model.stored_name).await {
                tracing::error!(
                    "Commit failed and published blob {} could not be removed: {}",
                    model.stored_name,
                    rm
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            "📦 Stored '{}' as {} ({} bytes, id={})",
            model.original_name,
            model.stored_name,
            model.size,
            model.id
        );

        Ok(model)
    }

    /// All records, newest first.
    pub async fn list_files(&self) -> Result<Vec<file_records::Model>, AppError> {
        let files = FileRecords::find()
            .order_by_desc(file_records::Column::UploadTime)
            .order_by_desc(file_records::Column::Id)
            .all(&self.db)
            .await?;
        Ok(files)
    }

    /// Resolve a record and open its blob, telling apart an unknown id from a
    /// record whose bytes have vanished.
    pub async fn open_download(
        &self,
        file_id: &str,
    ) -> Result<(file_records::Model, BlobReader), AppError> {
        let record = FileRecords::find_by_id(file_id.to_owned())
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("File not found".to_string()))?;

        if !self.blobs.exists(&record.stored_name).await? {
            tracing::warn!(
                "Record {} points at missing blob {}",
                record.id,
                record.stored_name
            );
            return Err(AppError::MissingBlob("File missing on server".to_string()));
        }

        let blob = self.blobs.open(&record.stored_name).await.map_err(|e| {
            // Removed between the existence check and the open
            tracing::warn!("Blob {} vanished while opening: {}", record.stored_name, e);
            AppError::MissingBlob("File missing on server".to_string())
        })?;

        Ok((record, blob))
    }
}
