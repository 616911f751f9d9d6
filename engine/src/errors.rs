//! Engine error types
//!
//! Recoverable conditions (empty baseline, unknown taxonomy id, idempotent
//! skip) never surface here; they are absorbed into summaries and logs.
//! What remains is structural: bad input, bad configuration, or a store that
//! could not complete a request.

use std::fmt;
use thiserror::Error;

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// `finz.toml` or env misconfigured
    ConfigError,
    /// Taxonomy table could not be loaded or is inconsistent
    TaxonomyError,
    /// Month index or calendar month out of the supported range
    CalendarError,
    /// Baseline failed structural validation
    ValidationError,
    /// Upstream payload could not be decoded
    IngestError,
    /// Persistence layer failures
    StoreError,
    /// Requested record does not exist
    NotFound,
    /// Handoff refused because materialization did not complete
    HandoffError,
    /// Unexpected logic bugs
    InternalError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::TaxonomyError => "TAXONOMY_ERROR",
            Self::CalendarError => "CALENDAR_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::IngestError => "INGEST_ERROR",
            Self::StoreError => "STORE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::HandoffError => "HANDOFF_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether the problem lies in the request rather than the deployment
    /// (config file, taxonomy table, store).
    pub fn caller_fixable(&self) -> bool {
        matches!(
            self,
            Self::CalendarError
                | Self::ValidationError
                | Self::IngestError
                | Self::NotFound
                | Self::HandoffError
        )
    }
}

/// One problem found while validating a baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending field, e.g. `labor_estimates[2].end_month`
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All structural problems found in one baseline.
///
/// Carries the identifiers needed to diagnose the record without re-running
/// the pipeline. Either id may be empty when the payload itself lacked it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub project_id: String,
    pub baseline_id: String,
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let project = if self.project_id.is_empty() {
            "<unknown>"
        } else {
            self.project_id.as_str()
        };
        let baseline = if self.baseline_id.is_empty() {
            "<unknown>"
        } else {
            self.baseline_id.as_str()
        };
        write!(
            f,
            "baseline {baseline} (project {project}) is malformed: "
        )?;
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Engine error with category and context
#[derive(Debug, Error)]
pub enum FinzError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("taxonomy error: {message}")]
    Taxonomy {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("calendar error: {message}")]
    Calendar { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("ingest error: {message}")]
    Ingest {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("handoff blocked for baseline {baseline_id} (project {project_id}): {message}")]
    Handoff {
        project_id: String,
        baseline_id: String,
        message: String,
    },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl FinzError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::Taxonomy { .. } => ErrorCategory::TaxonomyError,
            Self::Calendar { .. } => ErrorCategory::CalendarError,
            Self::Validation(_) => ErrorCategory::ValidationError,
            Self::Ingest { .. } => ErrorCategory::IngestError,
            Self::Store { .. } => ErrorCategory::StoreError,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Handoff { .. } => ErrorCategory::HandoffError,
            Self::Internal { .. } => ErrorCategory::InternalError,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a taxonomy error
    pub fn taxonomy(message: impl Into<String>) -> Self {
        Self::Taxonomy {
            message: message.into(),
            source: None,
        }
    }

    /// Create a taxonomy error with source
    pub fn taxonomy_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Taxonomy {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a calendar error
    pub fn calendar(message: impl Into<String>) -> Self {
        Self::Calendar {
            message: message.into(),
        }
    }

    /// Create an ingest error
    pub fn ingest(message: impl Into<String>) -> Self {
        Self::Ingest {
            message: message.into(),
            source: None,
        }
    }

    /// Create an ingest error with source
    pub fn ingest_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Ingest {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error with source
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a handoff error
    pub fn handoff(
        project_id: impl Into<String>,
        baseline_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Handoff {
            project_id: project_id.into(),
            baseline_id: baseline_id.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, FinzError>;
