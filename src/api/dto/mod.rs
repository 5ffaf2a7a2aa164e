//! Data Transfer Objects for REST request/response serialization.

pub mod feed_dto;

pub use feed_dto::*;
