//! Data models for the team finder.
//!
//! The same types travel over the backend API, the local cache and the
//! pending-mutation queue.

mod mutation;
mod request;

pub use mutation::*;
pub use request::*;
