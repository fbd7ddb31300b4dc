//! Pipeline stages.
//!
//! ```text
//! upload ─▶ classify ─┬─▶ office (soffice) ─▶ render (pdftoppm) ─▶ assemble
//!                     └──────── PDF ────────▶ render (pdftoppm) ─▶ assemble
//! ```
//!
//! `process` is the only module that launches anything; `office` and
//! `render` build argument vectors and validate what the tools leave behind.

pub mod assemble;
pub mod classify;
pub mod encode;
pub mod office;
pub mod process;
pub mod render;
