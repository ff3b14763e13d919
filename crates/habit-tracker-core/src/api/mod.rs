//! REST API access for the habit tracker.
//!
//! All requests go through the [`Gateway`], which attaches the session's
//! bearer token and ends the session when the API rejects it. [`HabitApi`]
//! is the typed client for the habit endpoints on top of it.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::HabitApi;
pub use error::ApiError;
pub use gateway::Gateway;
