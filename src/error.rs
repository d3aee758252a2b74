//! # Dataset Error Handling
//!
//! Every failure in this crate is a hard stop: the adapter runs as an offline data
//! preparation step, so nothing is retried and there are no partial results. The error
//! type therefore focuses on *explaining* the failure well enough for an operator to fix
//! the dataset on disk.
//!
//! ## Architecture
//!
//! - **Error Types**: one variant per failure domain, with structured fields
//! - **Error Context**: operation, free-form context, recovery suggestion, severity
//! - **Error Chaining**: I/O, JSON, image and resize errors keep their source
//!
//! ## Usage
//!
//! ```rust
//! use coco_mots::error::{DatasetError, HasRecoverySuggestion};
//!
//! let error = DatasetError::cache("img_resized_cache_train2017.array", "length mismatch")
//!     .with_operation("open image cache")
//!     .with_recovery_suggestion("delete the cache file and rebuild it");
//!
//! assert_eq!(error.category(), "cache");
//! assert!(error.recovery_suggestion().is_some());
//! ```

use std::{error::Error as StdError, fmt};

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Warnings that may indicate potential issues
    Warning,
    /// Errors that abort the current request
    Error,
    /// Fatal errors: the dataset cannot be used as configured
    Fatal,
}

/// Metadata about where and why an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    fn fatal() -> Self {
        Self {
            severity: ErrorSeverity::Fatal,
            ..Self::default()
        }
    }
}

/// Base error type for the dataset adapter
#[derive(Debug)]
pub enum DatasetError {
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Missing or malformed annotation data
    Annotation {
        source_name: String,
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// Image file could not be decoded
    Decode {
        path: String,
        source: Option<image::ImageError>,
        context: ErrorContext,
    },
    /// Resized image cache problems
    Cache {
        path: String,
        reason: String,
        context: ErrorContext,
    },
    /// Two options were requested together that cannot be combined
    UnsupportedCombination {
        first: String,
        second: String,
        context: ErrorContext,
    },
    /// Label rows and mask slices disagree for one sample
    InstanceMismatch {
        index: usize,
        label_rows: usize,
        mask_slices: usize,
        context: ErrorContext,
    },
    /// No sample carries a retained instance
    NoValidSample {
        samples: usize,
        context: ErrorContext,
    },
    /// A sample or instance index is out of range
    IndexOutOfRange {
        what: String,
        index: usize,
        len: usize,
        context: ErrorContext,
    },
    /// External library errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl DatasetError {
    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::fatal(),
        }
    }

    /// Create an annotation error
    pub fn annotation(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Annotation {
            source_name: source_name.into(),
            reason: reason.into(),
            context: ErrorContext::fatal(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error tied to a path
    pub fn io_at(
        operation: impl Into<String>,
        path: impl AsRef<std::path::Path>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.as_ref().display().to_string()),
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an image decode error
    pub fn decode(path: impl AsRef<std::path::Path>, source: Option<image::ImageError>) -> Self {
        Self::Decode {
            path: path.as_ref().display().to_string(),
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create a cache error
    pub fn cache(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cache {
            path: path.into(),
            reason: reason.into(),
            context: ErrorContext::fatal(),
        }
    }

    /// Create an unsupported-combination error
    pub fn unsupported(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::UnsupportedCombination {
            first: first.into(),
            second: second.into(),
            context: ErrorContext::fatal(),
        }
    }

    /// Create an instance count mismatch error
    pub fn instance_mismatch(index: usize, label_rows: usize, mask_slices: usize) -> Self {
        Self::InstanceMismatch {
            index,
            label_rows,
            mask_slices,
            context: ErrorContext::fatal(),
        }
    }

    /// Create a no-valid-sample error
    pub fn no_valid_sample(samples: usize) -> Self {
        Self::NoValidSample {
            samples,
            context: ErrorContext::fatal(),
        }
    }

    /// Create an index error
    pub fn index_out_of_range(what: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            what: what.into(),
            index,
            len,
            context: ErrorContext::new(),
        }
    }

    /// Create an external library error
    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Annotation { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Decode { context, .. } => context,
            Self::Cache { context, .. } => context,
            Self::UnsupportedCombination { context, .. } => context,
            Self::InstanceMismatch { context, .. } => context,
            Self::NoValidSample { context, .. } => context,
            Self::IndexOutOfRange { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Annotation { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Decode { context, .. } => context,
            Self::Cache { context, .. } => context,
            Self::UnsupportedCombination { context, .. } => context,
            Self::InstanceMismatch { context, .. } => context,
            Self::NoValidSample { context, .. } => context,
            Self::IndexOutOfRange { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Annotation { .. } => "annotation",
            Self::Io { .. } => "io",
            Self::Decode { .. } => "decode",
            Self::Cache { .. } => "cache",
            Self::UnsupportedCombination { .. } => "unsupported_combination",
            Self::InstanceMismatch { .. } => "instance_mismatch",
            Self::NoValidSample { .. } => "no_valid_sample",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::External { .. } => "external",
        }
    }
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            DatasetError::Annotation {
                source_name,
                reason,
                ..
            } => {
                write!(f, "Invalid annotations in {}: {}", source_name, reason)
            }
            DatasetError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            DatasetError::Decode { path, source, .. } => match source {
                Some(source) => write!(f, "Failed to decode image '{}': {}", path, source),
                None => write!(f, "Failed to decode image '{}': no pixel data", path),
            },
            DatasetError::Cache { path, reason, .. } => {
                write!(f, "Image cache '{}' unusable: {}", path, reason)
            }
            DatasetError::UnsupportedCombination { first, second, .. } => {
                write!(f, "{} is not supported together with {}", first, second)
            }
            DatasetError::InstanceMismatch {
                index,
                label_rows,
                mask_slices,
                ..
            } => {
                write!(
                    f,
                    "Sample {} has {} label rows but {} instance masks",
                    index, label_rows, mask_slices
                )
            }
            DatasetError::NoValidSample { samples, .. } => {
                write!(
                    f,
                    "None of the {} samples has an instance that survives filtering",
                    samples
                )
            }
            DatasetError::IndexOutOfRange {
                what, index, len, ..
            } => {
                write!(f, "{} index {} out of range (len {})", what, index, len)
            }
            DatasetError::External {
                library, source, ..
            } => {
                write!(f, "External library error in {}: {}", library, source)
            }
        }
    }
}

impl StdError for DatasetError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Decode {
                source: Some(source),
                ..
            } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for DatasetError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Trait for errors that provide recovery suggestions
pub trait HasRecoverySuggestion {
    /// Get recovery suggestion for this error
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for DatasetError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Check if an error means the dataset cannot be used as configured
    pub fn is_fatal(error: &DatasetError) -> bool {
        matches!(
            error,
            DatasetError::Config { .. }
                | DatasetError::Annotation { .. }
                | DatasetError::UnsupportedCombination { .. }
                | DatasetError::InstanceMismatch { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }

    /// Check if the fix lies in the files on disk rather than the calling code
    pub fn is_data_problem(error: &DatasetError) -> bool {
        matches!(
            error,
            DatasetError::Annotation { .. }
                | DatasetError::Io { .. }
                | DatasetError::Decode { .. }
                | DatasetError::Cache { .. }
                | DatasetError::NoValidSample { .. }
        )
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<image::ImageError> for DatasetError {
    fn from(error: image::ImageError) -> Self {
        Self::external("image", error)
    }
}

impl From<coco_scale::ScaleError> for DatasetError {
    fn from(error: coco_scale::ScaleError) -> Self {
        Self::external("coco_scale", error)
    }
}

impl From<ndarray::ShapeError> for DatasetError {
    fn from(error: ndarray::ShapeError) -> Self {
        Self::external("ndarray", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = DatasetError::config("max_inst", "0", "must be greater than 0");
        assert_eq!(error.category(), "config");
        assert!(classify::is_fatal(&error));
        assert_eq!(
            error.to_string(),
            "Configuration error in 'max_inst': must be greater than 0 (value: 0)"
        );
    }

    #[test]
    fn test_error_with_context() {
        let error = DatasetError::cache("cache.array", "length mismatch")
            .with_operation("open image cache")
            .with_recovery_suggestion("delete the cache file");

        assert_eq!(error.category(), "cache");
        assert_eq!(error.context().operation.as_deref(), Some("open image cache"));
        assert_eq!(error.recovery_suggestion(), Some("delete the cache file"));
        assert!(classify::is_data_problem(&error));
    }

    #[test]
    fn test_error_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = DatasetError::io_at("read annotations", "/data/a.json", io);
        assert!(error.source().is_some());
        assert!(error.to_string().contains("/data/a.json"));

        let decode = DatasetError::decode("/data/x.jpg", None);
        assert!(decode.source().is_none());
        assert!(decode.to_string().contains("no pixel data"));
    }

    #[test]
    fn test_error_classification() {
        let mismatch = DatasetError::instance_mismatch(3, 2, 1);
        assert!(classify::is_fatal(&mismatch));
        assert_eq!(mismatch.severity(), ErrorSeverity::Fatal);

        let index = DatasetError::index_out_of_range("sample", 10, 4);
        assert!(!classify::is_fatal(&index));
        assert!(!classify::is_data_problem(&index));
    }
}
