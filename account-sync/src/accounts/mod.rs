//! Account service integration.
//!
//! [`AccountApi`] is the seam between event processing and the remote
//! account service. [`HttpAccountApi`] talks to it over JSON/HTTP;
//! [`InMemoryAccountApi`] keeps accounts in process for tests and local runs.

pub mod client;
pub mod memory;
pub mod types;

pub use client::{AccountApi, AccountApiError, HttpAccountApi, SharedAccountApi};
pub use memory::{AccountCall, InMemoryAccountApi};
pub use types::{Account, CreateAccount, UpdateAccount};
