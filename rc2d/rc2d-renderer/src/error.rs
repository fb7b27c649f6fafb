use thiserror::Error;

use crate::kernels::KernelId;

#[derive(Error, Debug)]
pub enum GiError {
    #[error("GI settings object is missing (host misconfiguration)")]
    MissingSettings,

    #[error("kernel {kernel} failed: {message}")]
    Kernel { kernel: KernelId, message: String },

    #[error("frame resolution {width}x{height} exceeds device texture limit {limit}")]
    ResolutionTooLarge { width: u32, height: u32, limit: u32 },

    /// A frame recorded commands the device rejected (bad bind, missing pipeline,
    /// invalid encoder). Reported at the end of the frame instead of via the device's
    /// uncaptured-error handler.
    #[error("frame dispatch failed validation: {0}")]
    Dispatch(String),

    #[error("texture allocation failed: {0}")]
    Allocation(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("readback failed: {0}")]
    Readback(String),
}

pub type Result<T> = std::result::Result<T, GiError>;
