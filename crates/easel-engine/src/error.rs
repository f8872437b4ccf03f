use thiserror::Error;

/// Failure to obtain or prepare a GPU-side resource.
///
/// Recoverable during traversal: the node is painted with a placeholder,
/// the error goes to the context's error handler and the frame continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("failed to fetch image `{url}`: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode image `{url}`: {reason}")]
    Decode { url: String, reason: String },

    #[error("unsupported image url `{url}`")]
    UnsupportedUrl { url: String },

    #[error("no font available for family `{family}`")]
    FontUnavailable { family: String },

    #[error("invalid font data for `{family}`: {reason}")]
    InvalidFont { family: String, reason: String },

    #[error("gpu context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    #[error("texture {width}x{height} needs {expected} bytes, got {len}")]
    TextureSize {
        width: u32,
        height: u32,
        len: usize,
        expected: usize,
    },

    #[error("{what} {width}x{height} exceeds the maximum dimension {max}")]
    TooLarge {
        what: &'static str,
        width: u32,
        height: u32,
        max: u32,
    },

    #[error("surface readback failed: {0}")]
    Readback(String),
}

/// Failure to turn surface pixels into an encoded image.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error(transparent)]
    Readback(#[from] ResourceError),

    #[error("png encoding failed: {0}")]
    Png(#[from] image::ImageError),

    #[error("cannot encode an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error("encoder produced no data")]
    NoData,
}

/// Failure of a capture that re-renders the scene.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("re-render at {width}x{height} failed")]
    Rerender {
        width: u32,
        height: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot resize the surface to {width}x{height}")]
    Resize {
        width: u32,
        height: u32,
        #[source]
        source: ResourceError,
    },

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
