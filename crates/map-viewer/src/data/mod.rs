// src/data/mod.rs
//! Layer data handling for the map viewer.
//!
//! This module provides functionality for:
//! - Describing layers and holding their loaded features.
//! - Loading layer sources off the UI thread.

pub mod loader;
pub mod types;

// Re-export commonly used types for convenience.
pub use self::loader::{spawn_loads, LoadEvent};
pub use self::types::{Layer, LayerDataset, LayerRegistry, LayerSpec, SourceSpec};
