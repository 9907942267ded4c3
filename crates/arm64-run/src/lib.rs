//! Loads raw A64 images into guest memory and runs them on a guest thread.

use tracing_subscriber as _;

/// Raw image ingestion and placement in guest memory.
pub mod image;
/// Machine construction and single-thread execution.
pub mod session;

pub use image::{GuestImage, ImageError};
pub use session::{run, RunOptions, RunReport, SessionError};
