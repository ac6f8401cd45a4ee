//! Error types for focaltrack

use thiserror::Error;

/// Main error type for focaltrack
#[derive(Error, Debug)]
pub enum FocalTrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Haptics error: {0}")]
    Haptics(#[from] HapticsError),

    #[error("Viewer error: {0}")]
    Viewer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

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

/// Depth camera errors
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Required sensor not available: {0}")]
    MissingSensor(String),

    #[error("Stream not enabled: {0}")]
    StreamDisabled(String),

    #[error("Frame source closed")]
    Closed,
}

/// Tracking-related errors (landmark receiver + helper subprocess)
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Landmark receiver error: {0}")]
    Receiver(String),

    #[error("Landmark subprocess error: {0}")]
    Subprocess(String),
}

/// Haptics controller errors
#[derive(Error, Debug)]
pub enum HapticsError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Controller is not open")]
    NotOpen,

    #[error("No acknowledgement within {0:?}")]
    AckTimeout(std::time::Duration),

    #[error("Geometry has no devices")]
    EmptyGeometry,
}

/// Transport-level errors reported by a [`crate::haptics::Link`]
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to open link: {0}")]
    Open(String),

    #[error("Link lost: {0}")]
    Lost(String),

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Link is closed")]
    Closed,
}

/// Result type alias for focaltrack operations
pub type Result<T> = std::result::Result<T, FocalTrackError>;
