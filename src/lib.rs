//! The `seisray` crate provides tools for tracing seismic rays through 3D velocity models.
pub mod num;
pub mod geometry;
pub mod error;
pub mod grid;
pub mod field;
pub mod events;
pub mod interpolation;
pub mod tracing;
