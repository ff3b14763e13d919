//! Authentication module for managing the user's session.
//!
//! This module provides:
//! - `SessionManager`: login, registration, logout and verification
//! - `SharedSession`: the single owned session shared with the gateway and guard
//! - `CredentialStore`: durable storage for the session (file, OS keychain, memory)
//!
//! Token and user profile are always stored and cleared together.

pub mod credentials;
pub mod manager;
pub mod session;

pub use credentials::{
    CredentialRecord, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore,
};
pub use manager::{SessionManager, Verification, MIN_PASSWORD_LENGTH};
pub use session::{Session, SessionEvent, SessionState, SharedSession};
