//! Client-side transfer state machine.
//!
//! One transfer at a time moves `Idle -> Selecting -> Uploading -> Completed`
//! and back to `Idle`; a failure or a cancel drops straight back to `Idle`.
//! The controller itself is synchronous and does no I/O. [`run_transfer`]
//! drives it against a [`FileShareClient`].

use crate::api::handlers::files::FileRecord;
use crate::client::api::{ClientError, FileShareClient};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long a finished transfer keeps showing 100% before progress resets.
pub const PROGRESS_RESET_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Selecting,
    Uploading,
    Completed,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransferError {
    #[error("A transfer is already in progress")]
    Busy,

    #[error("No file selected")]
    NothingSelected,
}

/// Result of a pause/resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// There is no pause/resume protocol; the transfer is left untouched.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl SelectedFile {
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        Ok(Self {
            path,
            name,
            size: meta.len(),
        })
    }

    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

/// Handed out by [`TransferController::start`]; ties callbacks to one transfer.
#[derive(Debug, Clone)]
pub struct TransferTicket {
    pub generation: u64,
    pub file: SelectedFile,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub enum TransferOutcome {
    Completed(FileRecord),
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
pub struct TransferController {
    phase: TransferPhase,
    selected: Option<SelectedFile>,
    progress: u8,
    error: Option<String>,
    completed: u64,
    generation: u64,
    cancel: Option<CancellationToken>,
    files: Vec<FileRecord>,
    listing_stale: bool,
}

impl Default for TransferController {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferController {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
            selected: None,
            progress: 0,
            error: None,
            completed: 0,
            generation: 0,
            cancel: None,
            files: Vec::new(),
            listing_stale: true,
        }
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn listing_stale(&self) -> bool {
        self.listing_stale
    }

    pub fn ongoing_transfers(&self) -> u32 {
        u32::from(self.phase == TransferPhase::Uploading)
    }

    pub fn pending_transfers(&self) -> u32 {
        u32::from(self.phase == TransferPhase::Uploading)
    }

    pub fn completed_transfers(&self) -> u64 {
        self.completed
    }

    /// Pick a file from a picker or drop. Only the first candidate is kept.
    pub fn select(&mut self, candidates: Vec<SelectedFile>) -> Result<(), TransferError> {
        if self.phase == TransferPhase::Uploading {
            return Err(TransferError::Busy);
        }
        let file = candidates
            .into_iter()
            .next()
            .ok_or(TransferError::NothingSelected)?;
        self.selected = Some(file);
        self.phase = TransferPhase::Selecting;
        Ok(())
    }

    pub fn start(&mut self) -> Result<TransferTicket, TransferError> {
        if self.phase == TransferPhase::Uploading {
            return Err(TransferError::Busy);
        }
        let file = match (&self.phase, &self.selected) {
            (TransferPhase::Selecting, Some(file)) => file.clone(),
            _ => return Err(TransferError::NothingSelected),
        };

        self.generation += 1;
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        self.phase = TransferPhase::Uploading;
        self.progress = 0;
        self.error = None;

        tracing::debug!("Transfer #{} started for {}", self.generation, file.name);

        Ok(TransferTicket {
            generation: self.generation,
            file,
            cancel,
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.phase == TransferPhase::Uploading && self.generation == generation
    }

    /// Progress only moves forward, and only when the total is known.
    pub fn on_progress(&mut self, generation: u64, sent: u64, total: Option<u64>) {
        if !self.is_current(generation) {
            return;
        }
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let percent = ((sent as f64 * 100.0) / total as f64).round().min(100.0) as u8;
        if percent > self.progress {
            self.progress = percent;
        }
    }

    /// Returns `false` when the transfer was cancelled or superseded meanwhile.
    pub fn complete(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.phase = TransferPhase::Completed;
        self.progress = 100;
        self.completed += 1;
        self.selected = None;
        self.cancel = None;
        self.listing_stale = true;
        true
    }

    /// Clear the 100% shown after a completion. No-op if something else has
    /// happened since.
    pub fn reset_progress(&mut self, generation: u64) {
        if self.phase == TransferPhase::Completed && self.generation == generation {
            self.progress = 0;
            self.phase = TransferPhase::Idle;
        }
    }

    pub fn fail(&mut self, generation: u64, message: impl Into<String>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.phase = TransferPhase::Idle;
        self.error = Some(message.into());
        self.cancel = None;
        true
    }

    /// Abort whatever is in flight and go back to `Idle`. Returns whether a
    /// running upload was actually aborted.
    pub fn cancel(&mut self) -> bool {
        let aborted = match self.cancel.take() {
            Some(token) if self.phase == TransferPhase::Uploading => {
                token.cancel();
                true
            }
            _ => false,
        };
        self.phase = TransferPhase::Idle;
        self.progress = 0;
        self.selected = None;
        aborted
    }

    pub fn pause(&mut self) -> ControlOutcome {
        tracing::debug!("Pause requested; no resumable transfer protocol");
        ControlOutcome::Unsupported
    }

    pub fn resume(&mut self) -> ControlOutcome {
        tracing::debug!("Resume requested; no resumable transfer protocol");
        ControlOutcome::Unsupported
    }

    pub fn set_files(&mut self, files: Vec<FileRecord>) {
        self.files = files;
        self.listing_stale = false;
    }

    pub fn set_listing_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

pub type SharedController = Arc<Mutex<TransferController>>;

pub fn shared_controller() -> SharedController {
    Arc::new(Mutex::new(TransferController::new()))
}

fn lock(controller: &SharedController) -> MutexGuard<'_, TransferController> {
    controller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Re-fetch the listing into the controller.
pub async fn refresh_listing(controller: &SharedController, client: &FileShareClient) {
    match client.list_files().await {
        Ok(files) => lock(controller).set_files(files),
        Err(e) => {
            tracing::warn!("Failed to fetch files: {}", e);
            lock(controller).set_listing_error("Failed to fetch files");
        }
    }
}

/// Drive the currently selected file through one upload.
pub async fn run_transfer(
    controller: &SharedController,
    client: &FileShareClient,
) -> Result<TransferOutcome, TransferError> {
    let ticket = lock(controller).start()?;
    let generation = ticket.generation;

    let progress_target = controller.clone();
    let result = client
        .upload(
            &ticket.file.path,
            move |sent, total| lock(&progress_target).on_progress(generation, sent, total),
            ticket.cancel.clone(),
        )
        .await;

    let outcome = match result {
        Ok(response) => {
            if lock(controller).complete(generation) {
                let delayed = controller.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(PROGRESS_RESET_DELAY).await;
                    lock(&delayed).reset_progress(generation);
                });
                TransferOutcome::Completed(response.file)
            } else {
                TransferOutcome::Cancelled
            }
        }
        Err(ClientError::Cancelled) => TransferOutcome::Cancelled,
        Err(e) => {
            tracing::warn!("Upload of {} failed: {}", ticket.file.name, e);
            lock(controller).fail(generation, format!("Upload failed: {}", e));
            TransferOutcome::Failed(e.to_string())
        }
    };

    if matches!(outcome, TransferOutcome::Completed(_)) {
        refresh_listing(controller, client).await;
    }

    Ok(outcome)
}
