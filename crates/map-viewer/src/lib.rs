// src/lib.rs
//! Interactive point-layer map viewer library.
//!
//! This library keeps a map, a feature table and a popup in step with one
//! persisted view state (active layer, filter text, camera, table visibility)
//! and drives an automatic presentation tour over the active layer.

pub mod app;
pub mod camera;
pub mod cluster;
pub mod config;
pub mod data;
pub mod filter;
pub mod renderer;
pub mod state;
pub mod storage;
pub mod style;
pub mod surfaces;
pub mod sync;
pub mod tour;
pub mod ui;
