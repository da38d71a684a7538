//! Style Enforcement Tests
//!
//! Checks patterns that clippy does not catch on its own.
//!
//! - `dead_code_enforcement` - Prevents #[allow(dead_code)] in production code
//!
//! These tests scan the whole workspace and fail if violations are found.

#[path = "style/dead_code_enforcement.rs"]
mod dead_code_enforcement;
