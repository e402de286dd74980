//! HTTP handlers. Each one extracts the caller, hands the request to a
//! service and shapes the JSON response.

pub mod auth_handlers;
pub mod blob_handlers;
pub mod bucket_handlers;
pub mod extract;
pub mod file_handlers;
pub mod health_handlers;
pub mod user_handlers;
