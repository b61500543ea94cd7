//! Error types for report rendering.
//!
//! Per-item failures during bulk enumeration never surface here; they are
//! logged and skipped by the renderers. A `StatusError` aborts exactly one
//! report and is turned into the plain-text error body by the dispatcher.

use thiserror::Error;

use crate::registry::BeanName;

/// Failure of a single report.
#[derive(Debug, Error)]
pub enum StatusError {
    /// A required application collaborator is not wired in.
    #[error("Could not get {0} bean.")]
    MissingCollaborator(&'static str),

    /// The datasource collaborator is absent.
    #[error("No data source found.")]
    NoDataSource,

    /// Cache name lookup failed.
    #[error("No such cache name.")]
    CacheNotFound(String),

    /// A bean disappeared between discovery and inspection.
    #[error("bean {0} is no longer registered")]
    BeanNotFound(BeanName),

    /// The bean does not expose the requested attribute.
    #[error("attribute {attribute} not found on {bean}")]
    AttributeNotFound { bean: BeanName, attribute: String },

    /// The bean failed while producing an attribute value.
    #[error("error reading attribute {attribute} of {bean}: {reason}")]
    AttributeRead {
        bean: BeanName,
        attribute: String,
        reason: String,
    },

    /// Platform data (e.g. /proc) could not be read.
    #[error("{0}")]
    Platform(String),

    /// The report exceeded the configured time budget.
    #[error("report timed out after {0} ms")]
    Timeout(u64),

    /// The report panicked or its worker was lost.
    #[error("report failed: {0}")]
    Internal(String),

    /// Writing to the output sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used by report functions.
pub type Result<T> = std::result::Result<T, StatusError>;
