// Fields read only by the derived Display impls trip unused_assignments.
#![allow(unused_assignments)]

//! Errors raised while a model mesh is checked and indexed.
//!
//! Codes follow `MESH-XXXX`, grouped by the stage that failed:
//! `MESH-2xxx` for bad input data, `MESH-3xxx` for index construction.
//!
//! ```rust,ignore
//! let err = IndexedMesh::new(mesh).unwrap_err();
//! eprintln!("[{}] {err}", err.code());
//! eprintln!("hint: {}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use thiserror::Error;

pub type MeshResult<T> = Result<T, MeshError>;

/// Stable code of a [`MeshError`], for logs and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MESH-2001
    InvalidVertexIndex = 2001,
    /// MESH-2002
    InvalidCoordinate = 2002,
    /// MESH-2003
    EmptyMesh = 2003,
    /// MESH-3001
    IndexBuildFailed = 3001,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidVertexIndex => "MESH-2001",
            Self::InvalidCoordinate => "MESH-2002",
            Self::EmptyMesh => "MESH-2003",
            Self::IndexBuildFailed => "MESH-3001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller can do about a rejected mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// The model has to be fixed before slicing, e.g. in a repair tool.
    RunRepair { operations: Vec<String> },
    /// The data was probably damaged on its way in.
    CheckSourceMesh { checks: Vec<String> },
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunRepair { operations } => {
                write!(f, "repair the model ({})", operations.join(", "))
            }
            Self::CheckSourceMesh { checks } => {
                write!(f, "check the model file ({})", checks.join(", "))
            }
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    #[error("nothing to support: {details}")]
    #[diagnostic(
        code(mesh::input::empty),
        help("Supports can only be generated for a model with at least one triangle.")
    )]
    EmptyMesh { details: String },

    #[error(
        "face {face_index} uses vertex {vertex_index} but the model has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(mesh::input::vertex_index),
        help("The face list does not match the vertex list; drop the broken faces.")
    )]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    #[error("vertex {vertex_index} has a non-finite {coordinate} coordinate ({value})")]
    #[diagnostic(
        code(mesh::input::coordinate),
        help("Every coordinate must be a finite number of millimeters.")
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    #[error("cannot index the model: {details}")]
    #[diagnostic(
        code(mesh::index::build),
        help("Zero-area triangles cannot be hit by a ray; remove them first.")
    )]
    IndexBuildFailed { details: String },
}

impl MeshError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            Self::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            Self::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            Self::IndexBuildFailed { .. } => ErrorCode::IndexBuildFailed,
        }
    }

    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        let list = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        match self {
            Self::EmptyMesh { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: list(&["the export contains geometry", "the right object was selected"]),
            },
            Self::InvalidVertexIndex { .. } => RecoverySuggestion::RunRepair {
                operations: list(&["drop faces with dangling indices"]),
            },
            Self::InvalidCoordinate { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: list(&["NaN or infinite coordinates"]),
            },
            Self::IndexBuildFailed { .. } => RecoverySuggestion::RunRepair {
                operations: list(&["remove zero-area faces"]),
            },
        }
    }

    pub fn empty_mesh(details: impl Into<String>) -> Self {
        Self::EmptyMesh {
            details: details.into(),
        }
    }

    pub fn invalid_vertex_index(face_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        Self::InvalidVertexIndex {
            face_index,
            vertex_index,
            vertex_count,
        }
    }

    pub fn invalid_coordinate(vertex_index: usize, coordinate: &'static str, value: f64) -> Self {
        Self::InvalidCoordinate {
            vertex_index,
            coordinate,
            value,
        }
    }

    pub fn index_build_failed(details: impl Into<String>) -> Self {
        Self::IndexBuildFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_variants() {
        let cases = [
            (MeshError::empty_mesh(""), "MESH-2003"),
            (MeshError::invalid_vertex_index(0, 9, 3), "MESH-2001"),
            (MeshError::invalid_coordinate(0, "x", f64::NAN), "MESH-2002"),
            (MeshError::index_build_failed(""), "MESH-3001"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code().to_string(), code);
        }
    }

    #[test]
    fn test_message_names_the_vertex() {
        let msg = MeshError::invalid_coordinate(3, "z", f64::INFINITY).to_string();
        assert_eq!(msg, "vertex 3 has a non-finite z coordinate (inf)");
    }

    #[test]
    fn test_recovery_text() {
        assert_eq!(
            MeshError::index_build_failed("flat").recovery_suggestion().to_string(),
            "repair the model (remove zero-area faces)"
        );
        assert!(matches!(
            MeshError::empty_mesh("no faces").recovery_suggestion(),
            RecoverySuggestion::CheckSourceMesh { .. }
        ));
    }
}
