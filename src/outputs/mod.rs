//! Output generation.
//!
//! # Submodules
//!
//! - [`digest`]: renders the week's stored articles as one HTML e-mail body
//!
//! The only output of the service is the weekly digest e-mail; daily
//! collection results go to the article store, not to disk as reports.

pub mod digest;
