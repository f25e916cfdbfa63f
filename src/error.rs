//! Error types for the panel driver.

use std::io;

/// Errors surfaced by the panel driver.
///
/// `WriteFailed` and `Disconnected` are normally absorbed by the link's
/// recovery protocol and never reach the caller; they are public because
/// recovery itself can exhaust its retry window and must report why.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// The link has no open byte sink.
    #[error("panel link is disconnected")]
    Disconnected,

    /// The underlying byte sink reported an I/O failure mid-write.
    #[error("write to panel failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// Reopening the sink failed because it is held by another session
    /// (permission denied, lock held, etc.).
    #[error("panel port busy: {0}")]
    PortBusy(#[source] io::Error),

    /// Recovery could not reopen the link within its retry window.
    #[error("recovery exhausted: {0}")]
    RecoveryExhausted(#[source] io::Error),

    /// Coordinates, dimensions, or other arguments were outside the
    /// logical surface or otherwise malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, PanelError>;
