//! Error types for jewel-tryon

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Landmark source errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Landmark receiver error: {0}")]
    Receiver(String),

    #[error("Landmark packet parse error: {0}")]
    Parse(String),

    #[error("Unexpected {kind} topology: got {actual} points, expected {expected}")]
    Topology {
        kind: &'static str,
        actual: usize,
        expected: usize,
    },
}

/// Accessory image loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to load image {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Loader for {0} went away before finishing")]
    Disconnected(PathBuf),
}

/// Snapshot and share errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Face or hand not detected. Please try again.")]
    NothingToCapture,

    #[error("Sharing not supported here. The snapshot is still saved at {0}")]
    ShareUnsupported(PathBuf),

    #[error("Share command failed: {0}")]
    ShareFailed(String),

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No camera found")]
    NoDeviceFound,

    #[error("Camera error: {0}")]
    Camera(#[from] nokhwa::NokhwaError),
}
