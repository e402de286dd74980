//! Core data models for the private file storage service.
//!
//! These entities represent users, buckets, the permissions that tie them
//! together, and the files stored inside buckets. They map to database tables
//! via `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod actor;
pub mod bucket;
pub mod file;
pub mod metadata;
pub mod page;
pub mod user;
