use sheetscan_core::{AlgorithmKind, ParamError};

/// Errors returned by the detection surface and the algorithm families.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("{operation} is not supported for algorithm kind {kind}")]
    UnhandledKind {
        kind: AlgorithmKind,
        operation: &'static str,
    },
    #[error("{operation} called out of order: {reason}")]
    WrongPhase {
        operation: &'static str,
        reason: String,
    },
    #[error("channel {channel} on \"{config}\" is outside 0..{channels}")]
    InvalidChannel {
        config: String,
        channel: i32,
        channels: u8,
    },
    #[error("fraction {value} on \"{config}\" must be between 0 and 1")]
    InvalidFraction { config: String, value: f32 },
    #[error("no alignment marks found")]
    NoAlignmentMarksFound,
    #[error("crop box {width}x{height}+{x}+{y} exceeds the {image_width}x{image_height} image")]
    CropOutOfBounds {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        image_width: u32,
        image_height: u32,
    },
    #[error("no image loaded")]
    ImageNotLoaded,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
