use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cannot open document: {0}")]
    StoreOpenError(String),

    #[error("PDF read error: {0}")]
    PdfReadError(String),

    #[error("Image XObject error: {0}")]
    ImageXObjectError(String),

    #[error("Soft mask unavailable: {0}")]
    MaskUnavailable(String),

    #[error("Color transform error: {0}")]
    ColorTransformError(String),

    #[error("Compositing error: {0}")]
    CompositingError(String),

    #[error("Image decode error: {0}")]
    DecodeError(String),

    #[error("Image encode error: {0}")]
    EncodeError(String),

    #[error("Manifest error: {0}")]
    ManifestError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`ExtractError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl ExtractError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create a fatal document-open error.
    store_open => StoreOpenError,
    /// Create a PDF read error.
    pdf_read => PdfReadError,
    /// Create an image XObject error.
    image_xobject => ImageXObjectError,
    /// Create a soft-mask-unavailable error.
    mask_unavailable => MaskUnavailable,
    /// Create a color transform error.
    color_transform => ColorTransformError,
    /// Create a compositing error.
    compositing => CompositingError,
    /// Create an image decode error.
    decode => DecodeError,
    /// Create an image encode error.
    encode => EncodeError,
}

impl From<lopdf::Error> for ExtractError {
    fn from(e: lopdf::Error) -> Self {
        Self::PdfReadError(e.to_string())
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(e: serde_json::Error) -> Self {
        Self::ManifestError(e.to_string())
    }
}

impl From<serde_yml::Error> for ExtractError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<image::ImageError> for ExtractError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(_) => Self::EncodeError(e.to_string()),
            other => Self::DecodeError(other.to_string()),
        }
    }
}

impl From<lcms2::Error> for ExtractError {
    fn from(e: lcms2::Error) -> Self {
        Self::ColorTransformError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
