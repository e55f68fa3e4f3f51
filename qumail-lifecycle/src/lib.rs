//! Key lifecycle orchestration for QuMail.
//!
//! Ties the entropy generator, OTP engine and key store together into the
//! send/receive flows: `compose` encrypts under a fresh single-use key and
//! shares it with the recipient, `open_message` fetches the holder's copy
//! and decrypts. External collaborators (content storage, integrity
//! stamping) enter through traits and are passed in explicitly — there is
//! no ambient global state to initialize.

mod config;
mod error;
mod manager;
mod services;

pub use config::QumailConfig;
pub use error::{LifecycleError, LifecycleResult};
pub use manager::{
    ComposedMessage, DecryptOutcome, KeyUnavailability, LifecycleManager, ShareStatus,
};
pub use services::{
    ContentStore, HashStamper, InMemoryContentStore, IntegrityStamper, ServiceError,
};
