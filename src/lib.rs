//! Yatube: a small community blog.
//!
//! Authors publish posts, optionally filed under a group and illustrated with
//! an image; readers browse paginated feeds and leave comments.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
