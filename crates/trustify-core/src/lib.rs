//! Core types and trait definitions for the Trustify internship-certification
//! workflow.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; the status state machine in [`transition`]
//! is the single authority on which changes an application may undergo.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod application;
pub mod certificate;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod store;
pub mod transition;
pub mod user;
pub mod workflow;

pub use error::{Error, Result};
