//! Utility Functions
//!
//! User-friendly error formatting for the binary.
//!
//! ```rust
//! use screen_coordinator::utils::format_user_error;
//!
//! let error = anyhow::anyhow!("Failed to parse config file");
//! eprintln!("{}", format_user_error(&error));
//! ```

pub mod errors;

pub use errors::format_user_error;
