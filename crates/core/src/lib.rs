//! Core types for narrata
//!
//! This crate provides foundational types used across all other crates:
//! - Segment and variant entities
//! - Text sanitization for TTS input
//! - Error types

pub mod error;
pub mod sanitize;
pub mod segment;

pub use error::{Error, Result};
pub use sanitize::sanitize;
pub use segment::{Segment, SegmentStatus, Variant};
