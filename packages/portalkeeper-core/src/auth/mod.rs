//! Portal credentials.
//!
//! Provides the credential type and the add/remove/reorder edits applied to
//! the stored rotation list.

mod credentials;

pub use credentials::{
    add_credential, move_credential, remove_credential, Credential, CredentialError,
};
