//! x86-64 specific components.
//!
//! - `encoder`: fixed-length encoding of IR instructions
//! - `stubs`: fallback exit programs for the executable writers

pub mod encoder;
pub mod stubs;

pub use encoder::X64Encoder;
