//! Shared test utilities for the bdl workspace.
//!
//! This crate is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`mock`] — [`MockEngine`], a scripted in-memory remote
//! - [`remote`] — [`TestRemote`], a directory served by the built-in local engine

pub mod mock;
pub mod remote;

pub use mock::MockEngine;
pub use remote::TestRemote;
