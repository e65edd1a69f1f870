use thiserror::Error;

use crate::surface::OverlayId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Chart surface has been disposed")]
    Disposed,

    #[error("Unknown overlay: {0}")]
    UnknownOverlay(OverlayId),

    #[error("Overlay {id} rejected: {reason}")]
    Rejected { id: OverlayId, reason: String },

    #[error("Index {index} out of range ({len} items)")]
    OutOfRange { index: usize, len: usize },
}
