//! Object identity for the git engine.
//!
//! Every object is named by the SHA-1 of its `"<type> <size>\0<payload>"`
//! serialization. This crate provides the [`ObjectId`] key type, hex
//! conversion, and a streaming [`Hasher`](hasher::Hasher) that also serves
//! pack and index trailers.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use oid::ObjectId;
