//! Account persistence.
//!
//! One trait, [`AccountStore`], abstracts the record store that backs
//! authentication; [`LibsqlStore`] implements it over libsql with in-memory,
//! local-file, and remote Turso constructors. [`StoreBackend`] picks one of
//! the three from the environment.
//!
//! Mutations that feed security decisions (lockout counters, refresh-token
//! rotation, challenge state) are single conditional statements; callers get
//! the outcome, never a read-modify-write window.

#![allow(missing_docs)]

pub mod account;
pub mod libsql;
pub mod traits;

// Re-exports
pub use account::{
    Account, LoginFailure, NewAccount, NewRefreshToken, ProfileChanges, RefreshTokenEntry,
};
pub use self::libsql::LibsqlStore;
pub use traits::{AccountStore, StoreBackend};
