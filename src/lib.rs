//! Vidfusion - chained ffmpeg transformations driven from job files
//!
//! This library crate exposes the application layer for integration testing.

pub mod config;
pub mod job;
