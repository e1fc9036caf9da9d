pub mod auth;
pub mod client;
pub mod types;

pub use auth::resolve_token_source;
pub use client::{ApiError, FetchOptions, FhirClient};
pub use types::SearchQuery;
