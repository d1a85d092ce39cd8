//! Transport adapter for the link service API.

pub mod api_types;
pub mod client;
mod error;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use client::ApiClient;
pub use error::ApiError;
