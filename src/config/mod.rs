//! # Configuration Module
//!
//! Centralizes the on-disk layout constants and the per-data-source
//! configuration loader.
//!
//! ## Module Organization
//!
//! - [`constants`]: every fixed value of the table file layout (paths,
//!   attribute names, chunk sizing, name limits). Interdependent values
//!   live side by side so they cannot drift apart.
//! - [`source`]: [`TdbConnectionConf`], the parsed per-data-source
//!   configuration (`DatabasePath`).

pub mod constants;
pub mod source;

pub use constants::*;
pub use source::TdbConnectionConf;
