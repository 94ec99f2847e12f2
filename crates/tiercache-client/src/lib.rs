//! tiercache client
//!
//! This crate provides the client side of the tiered cache: an optional
//! in-process memory tier in front of the HTTP edge cache, with per-call
//! control over memory caching and server-side persistence.

pub mod client;
pub mod error;

pub use client::{ClientConfig, DeleteOptions, GetOptions, KeyValClient, PutOptions};
pub use error::RequestError;
