//! AArch64 specific components.
//!
//! - `encoding`: raw instruction words
//! - `encoder`: IR instruction encoding
//! - `stubs`: fallback exit programs for the executable writers

pub mod encoder;
pub mod encoding;
pub mod stubs;

pub use encoder::Arm64Encoder;
