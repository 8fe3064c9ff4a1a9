//! Command implementations.

pub mod config;
pub mod download;
pub mod submit;
