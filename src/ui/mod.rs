//! # User Interface
//!
//! Colored terminal output with clickable links.

pub mod log;

pub use log::{debug, error, field, header, info, link, print_logo, success, warn, Log};
