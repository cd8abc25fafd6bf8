//! Secret model and storage contracts for the VSTS authentication library
//!
//! This crate holds the data the authentication flows produce and cache:
//! basic-auth [`Credential`]s, bearer [`Token`]s (access, refresh, and
//! personal access tokens), OAuth2 [`TokenPair`]s, and the [`VsoTokenScope`]
//! sets that personal access tokens are minted with.
//!
//! Secrets are cached in a pluggable [`SecretStore`], keyed by a stable,
//! namespaced name derived from the target URI (see [`key`]). Two store
//! implementations ship here: an in-memory map and an insecure XML file
//! backend compatible with the `insecureStore.xml` document other tools in
//! the family read and write. OS keychain backends implement the same trait
//! out of tree.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod credential;
pub mod key;
mod scope;
pub mod store;
mod token;
mod token_pair;

pub use credential::Credential;
pub use scope::VsoTokenScope;
pub use store::{InMemoryStore, SecretStore};
pub use token::{InvalidToken, Token, TokenKind};
pub use token_pair::TokenPair;
