//! Redrive Lambda handler and batch processing

pub mod handler;
pub mod processor;

// Re-export the main handler for convenience
pub use handler::handler;
pub use processor::Redriver;
