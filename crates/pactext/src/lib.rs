//! Public facade crate for `pactext`.
//!
//! This crate intentionally contains no IO or OCR-provider logic.
//! It re-exports the backend-agnostic types/traits from `pactext-core`.

pub use pactext_core::*;
