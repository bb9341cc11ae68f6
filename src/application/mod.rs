//! Application services: listings, post authoring and sessions.

pub mod auth;
pub mod error;
pub mod pagination;
pub mod posts;
pub mod repos;
