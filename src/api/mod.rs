//! S3-compatible HTTP surface: error mapping, XML rendering, and the thin
//! dispatcher over the chunked-body and listing cores.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod xml;

pub use errors::{write_error, S3Error};
pub use handlers::{router, AppState};
