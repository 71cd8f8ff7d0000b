//! Client side of the file-sharing service: an HTTP client, the transfer
//! state machine that drives uploads, and local display preferences.

pub mod api;
pub mod settings;
pub mod transfer;

pub use api::{ClientError, FileShareClient};
pub use settings::{ClientSettings, Language, Notifications};
pub use transfer::{
    ControlOutcome, SelectedFile, SharedController, TransferController, TransferError,
    TransferOutcome, TransferPhase, run_transfer,
};
