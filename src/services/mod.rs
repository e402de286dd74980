//! Business logic. Handlers call into these services with an explicit
//! `Actor`; nothing here knows about HTTP.

pub mod auth_service;
pub mod blob_store;
pub mod bucket_service;
pub mod error;
pub mod file_service;
pub mod password;
pub mod permission_service;
pub mod token_service;
pub mod url_signer;
pub mod user_service;
