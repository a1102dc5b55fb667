//! Link pipeline.
//!
//! Every operation passes the stages in order before the terminal transport
//! split picks HTTP or the streaming connection.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `pipeline` | Stage ordering and execution |
//! | `stage` | The [`Stage`] trait and built-in stages |

// ============================================================================
// Submodules
// ============================================================================

/// Stage ordering and execution.
pub mod pipeline;

/// Stage trait and built-in stages.
pub mod stage;

// ============================================================================
// Re-exports
// ============================================================================

pub use pipeline::{Execution, LinkTransform, Pipeline, SPLIT_STAGE, StageRef, compose_stages};
pub use stage::{ErrorContext, ErrorHandler, ErrorStage, FnStage, Stage};
