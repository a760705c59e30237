//! Ashen rendering backend.
//!
//! This crate owns the GPU resource layer used by higher engine layers:
//! shader loading, the pipeline cache, typed buffers and textures, and the
//! backend interface they are built on.

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod render;

pub use error::{RenderError, Result};
