//! Timing spans for geometry work.
//!
//! The crates only emit events; installing a subscriber is up to the
//! application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=sla_mesh=debug,sla_supports=debug for per-step detail
//! ```
//!
//! Timings are logged at INFO under the `sla_mesh::timing` target, so they
//! can be switched on alone with `RUST_LOG=sla_mesh::timing=info`.

use std::time::Instant;
use tracing::{Span, debug, info};

/// Opens an `sla_operation` span and logs the elapsed time when dropped.
///
/// ```rust,ignore
/// fn index(mesh: &Mesh) {
///     let _timer = OperationTimer::new("index_mesh");
///     // ...
/// } // "Operation completed" with elapsed_ms
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    _span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        debug!(target: "sla_mesh::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            _span: tracing::info_span!("sla_operation", operation = name),
        }
    }

    /// Timer whose span also records the size of the mesh being worked on.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        debug!(
            target: "sla_mesh::timing",
            operation = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            _span: tracing::info_span!(
                "sla_operation",
                operation = name,
                faces = face_count,
                vertices = vertex_count
            ),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "sla_mesh::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_elapsed_grows() {
        let timer = OperationTimer::with_context("test_op", 12, 8);
        let first = timer.elapsed_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.elapsed_ms() > first);
    }
}
