//! Change coordination for Keel stores.
//!
//! A store owns one value. [`Store::change`] runs a caller transform through
//! a [`ChangePolicy`] under exclusive access and reports exactly one
//! [`Outcome`](keel_core::Outcome).

pub mod async_store;
pub mod coordinator;
pub mod policy;
pub mod store;

pub use async_store::AsyncStore;
pub use coordinator::Attempt;
pub use policy::{ChangePolicy, FnPolicy, NoPolicy};
pub use store::Store;
