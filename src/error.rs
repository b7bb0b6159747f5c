// src/error.rs

use thiserror::Error;

/// Everything that can abort a capture. None of these are recoverable.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unable to connect to display")]
    ConnectFailed(#[from] x11rb::errors::ConnectError),

    #[error("unable to grab {what}")]
    GrabFailed {
        what: &'static str,
        #[source]
        source: Option<x11rb::errors::ReplyError>,
    },

    #[error("unable to {what}")]
    QueryFailed {
        what: &'static str,
        #[source]
        source: Option<x11rb::errors::ReplyOrIdError>,
    },

    #[error("unexpected key pressed during selection (keysym {0:#x})")]
    UnexpectedInput(u32),

    #[error("unable to write png data")]
    EncodeFailed(#[from] image::ImageError),

    #[error("unable to {what}")]
    IoFailed {
        what: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Wraps any x11rb failure (connection, reply or id exhaustion) as a failed query.
    pub fn query<E: Into<x11rb::errors::ReplyOrIdError>>(
        what: &'static str,
    ) -> impl FnOnce(E) -> Self {
        move |e| CaptureError::QueryFailed { what, source: Some(e.into()) }
    }

    pub fn io(what: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let what = what.into();
        move |source| CaptureError::IoFailed { what, source }
    }
}
