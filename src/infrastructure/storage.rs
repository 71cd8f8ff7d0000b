use crate::config::AppConfig;
use crate::services::blob_store::{BlobStore, LocalBlobStore};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<LocalBlobStore>> {
    info!(
        "🗄️  Blob Storage: {} (staging: {})",
        config.upload_dir.display(),
        config.staging_dir.display()
    );

    let store = LocalBlobStore::new(config.upload_dir.clone(), config.staging_dir.clone());
    store.ensure_dirs().await?;

    // Leftovers from uploads interrupted by a crash or restart
    let swept = store.sweep_staging().await?;
    if swept > 0 {
        info!("🧹 Removed {} stale staged upload(s)", swept);
    }

    info!("✅ Blob storage is ready");
    Ok(Arc::new(store))
}
