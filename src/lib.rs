//! firmdesk: client record reconciliation for law-firm practice management.
//!
//! The crate keeps a session-local roster of client records consistent with
//! a remote relational store that exposes clients in two shapes: a dedicated
//! `clients` table and a generic `profiles` table used as a fallback.
//!
//! Entry point for applications is [`clients::ClientSession`], built from a
//! [`db::RemoteStore`] and an [`identity::IdentityProvider`].

pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod settings;

pub use config::Config;
pub use error::{ClientError, ConfigError, ExportError, IdentityError, MappingError, RemoteError};
