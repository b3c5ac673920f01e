// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler.
#![allow(unused_assignments)]

//! Error types for support generation with rich diagnostics.
//!
//! Codes follow the pattern `SUPPORT-XXXX` where:
//! - 1xxx = Input validation errors
//! - 2xxx = Job control (cancellation)
//! - 3xxx = Errors from the mesh layer
//!
//! Per-point routing failures are not errors: they are reported as
//! unresolved points in the generated tree. Only cancellation and bad
//! input end a run early.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for support generation.
pub type SupportResult<T> = Result<T, SupportError>;

/// Machine-readable error codes for support generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportErrorCode {
    /// SUPPORT-1001: Input mesh is empty
    EmptyMesh = 1001,
    /// SUPPORT-1002: Invalid configuration
    InvalidConfig = 1002,

    /// SUPPORT-2001: Generation was stopped by the caller
    Stopped = 2001,

    /// SUPPORT-3001: Underlying mesh error
    MeshError = 3001,
}

impl SupportErrorCode {
    /// Returns the error code as a string in the format `SUPPORT-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportErrorCode::EmptyMesh => "SUPPORT-1001",
            SupportErrorCode::InvalidConfig => "SUPPORT-1002",
            SupportErrorCode::Stopped => "SUPPORT-2001",
            SupportErrorCode::MeshError => "SUPPORT-3001",
        }
    }
}

impl std::fmt::Display for SupportErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for support errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SupportRecoverySuggestion {
    /// Change a configuration value.
    AdjustConfig { param_name: String },
    /// Repair or reload the input mesh.
    RepairInputMesh,
    /// Run the generator again.
    Retry,
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for SupportRecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupportRecoverySuggestion::AdjustConfig { param_name } => {
                write!(f, "Adjust the `{}` configuration value", param_name)
            }
            SupportRecoverySuggestion::RepairInputMesh => {
                write!(f, "Repair the input mesh and try again")
            }
            SupportRecoverySuggestion::Retry => {
                write!(f, "Run support generation again when ready")
            }
            SupportRecoverySuggestion::None => {
                write!(f, "No specific suggestion available")
            }
        }
    }
}

/// Errors that end a support generation run.
#[derive(Debug, Error, Diagnostic)]
pub enum SupportError {
    /// Input mesh is empty.
    #[error("input mesh is empty")]
    #[diagnostic(
        code(support::input::empty),
        help("Support generation needs a mesh with at least one face.")
    )]
    EmptyMesh,

    /// Invalid configuration.
    #[error("invalid support configuration: {details}")]
    #[diagnostic(
        code(support::config::invalid),
        help("Radii and lengths must be finite and non-negative; bridge_slope must lie in (0, pi/2).")
    )]
    InvalidConfig {
        details: String,
        param_name: Option<String>,
        param_value: Option<String>,
    },

    /// Generation was cancelled by the caller.
    #[error("support generation stopped")]
    #[diagnostic(
        code(support::job::stopped),
        help("The stop predicate or progress callback requested cancellation. No supports were kept.")
    )]
    Stopped,

    /// Underlying mesh error.
    #[error("mesh operation failed: {0}")]
    #[diagnostic(code(support::mesh::error))]
    MeshError(#[from] sla_mesh::MeshError),
}

impl SupportError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> SupportErrorCode {
        match self {
            SupportError::EmptyMesh => SupportErrorCode::EmptyMesh,
            SupportError::InvalidConfig { .. } => SupportErrorCode::InvalidConfig,
            SupportError::Stopped => SupportErrorCode::Stopped,
            SupportError::MeshError(_) => SupportErrorCode::MeshError,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> SupportRecoverySuggestion {
        match self {
            SupportError::EmptyMesh => SupportRecoverySuggestion::RepairInputMesh,
            SupportError::InvalidConfig { param_name, .. } => match param_name {
                Some(name) => SupportRecoverySuggestion::AdjustConfig {
                    param_name: name.clone(),
                },
                None => SupportRecoverySuggestion::None,
            },
            SupportError::Stopped => SupportRecoverySuggestion::Retry,
            SupportError::MeshError(_) => SupportRecoverySuggestion::RepairInputMesh,
        }
    }

    /// True if the run was cancelled rather than failed.
    pub fn is_stopped(&self) -> bool {
        matches!(self, SupportError::Stopped)
    }

    // Constructor helpers

    /// Create an invalid config error with param info.
    pub fn invalid_param(
        param_name: impl Into<String>,
        param_value: impl std::fmt::Display,
        details: impl Into<String>,
    ) -> Self {
        SupportError::InvalidConfig {
            details: details.into(),
            param_name: Some(param_name.into()),
            param_value: Some(param_value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SupportError::EmptyMesh.code().as_str(), "SUPPORT-1001");
        assert_eq!(SupportError::Stopped.code(), SupportErrorCode::Stopped);
        assert_eq!(SupportErrorCode::MeshError.to_string(), "SUPPORT-3001");
    }

    #[test]
    fn test_invalid_param_suggestion() {
        let err = SupportError::invalid_param("bridge_slope", 2.0, "must be below pi/2");
        assert_eq!(err.code(), SupportErrorCode::InvalidConfig);
        assert_eq!(
            err.recovery_suggestion(),
            SupportRecoverySuggestion::AdjustConfig {
                param_name: "bridge_slope".into()
            }
        );
        assert!(err.to_string().contains("must be below pi/2"));
    }

    #[test]
    fn test_from_mesh_error() {
        let mesh_err = sla_mesh::MeshError::empty_mesh("test");
        let err: SupportError = mesh_err.into();
        assert!(matches!(err, SupportError::MeshError(_)));
        assert_eq!(err.code().as_str(), "SUPPORT-3001");
    }

    #[test]
    fn test_stopped() {
        assert!(SupportError::Stopped.is_stopped());
        assert!(!SupportError::EmptyMesh.is_stopped());
        assert_eq!(
            SupportError::Stopped.recovery_suggestion().to_string(),
            "Run support generation again when ready"
        );
    }
}
