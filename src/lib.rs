//! drive_ops - Basic Google Drive file operations from the command line.
//!
//! This library provides:
//! - A credential cache that reuses, refreshes or interactively acquires an
//!   OAuth2 credential and persists it to a local file
//! - A client to create, list, update and delete Drive files
//! - Argument validation and dispatch for the `drive_ops` binary
//!
//! # Example
//!
//! ```no_run
//! use drive_ops::{CredentialCache, DriveClient, InstalledFlow, DRIVE_SCOPE};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let flow = InstalledFlow::new("credentials.json");
//!     let cache = CredentialCache::new("token.json", flow);
//!     let client = DriveClient::new(cache, vec![DRIVE_SCOPE.to_string()]);
//!
//!     for file in client.list_files(10).await? {
//!         println!("{}", file);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod credential;
pub mod error;
pub mod models;
pub mod operations;
pub mod url_parser;

// Re-exports for convenience
pub use auth::{AuthFlow, InstalledFlow, DRIVE_METADATA_READONLY_SCOPE, DRIVE_SCOPE};
pub use cache::CredentialCache;
pub use client::DriveClient;
pub use credential::Credential;
pub use error::{DriveError, Result};
pub use models::FileMetadata;
pub use operations::{Action, FileArgs, Operation};
pub use url_parser::extract_id;
