use thiserror::Error;


pub type SplatResult<T> = Result<T, SplatError>;


#[derive(Error, Debug)]
pub enum SplatError {
    /// unrecognized magic or unsupported sub-encoding
    #[error("format error: {0}")]
    Format(String),

    /// required property or array missing, mistyped, or mis-shaped
    #[error("schema error: {0}")]
    Schema(String),

    #[error("truncated input: {declared} records need {required} bytes, {available} available")]
    Truncation {
        declared: usize,
        required: usize,
        available: usize,
    },

    #[error("spherical harmonic coefficient count {num_coefficients} is not (deg+1)^2 for a supported degree")]
    DegreeMismatch {
        num_coefficients: usize,
    },

    #[error("compression state error: {0}")]
    CompressionState(String),

    #[error("sort capacity exceeded: {requested} elements for a session sized to {capacity}")]
    SortCapacity {
        requested: usize,
        capacity: usize,
    },

    #[error("gpu device error: {0}")]
    Device(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplatError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// capacity and device errors require the sort session to be rebuilt
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SortCapacity { .. } | Self::Device(_))
    }
}
