//! Error taxonomy shared by every backend.

use crate::ids::EntryId;
use crate::image::ImageError;

/// Errors surfaced synchronously at the API boundary.
///
/// `NativeOpFailed` and `ImageNormalizationFailed` are produced inside UI tasks; those are
/// logged and absorbed rather than returned, the model stays authoritative.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("backend `{backend}` is unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("entry {0} is already attached to a menu")]
    AlreadyAttached(EntryId),

    #[error("entry {0} is not attached to this menu")]
    NotAttached(EntryId),

    #[error("adding entry {0} would make a submenu contain itself")]
    WouldCycle(EntryId),

    #[error("the UI queue has been shut down")]
    QueueClosed,

    #[error("native operation `{op}` failed: {reason}")]
    NativeOpFailed { op: &'static str, reason: String },

    #[error("image normalization failed: {0}")]
    ImageNormalizationFailed(#[from] ImageError),
}

impl Error {
    pub(crate) fn native(op: &'static str, err: &anyhow::Error) -> Self {
        Error::NativeOpFailed {
            op,
            reason: format!("{err:#}"),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
