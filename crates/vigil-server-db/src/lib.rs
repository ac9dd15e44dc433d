// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for the Vigil scanner.
//!
//! Every entity gets a `*Store` trait and a `*Repository` that implements it
//! over a shared [`SqlitePool`](sqlx::SqlitePool).
//!
//! # Architecture
//!
//! - `user` - accounts plus the `authenticate` / `identity` lookups
//! - `role` - roles and the `user_roles` association
//! - `domain` - scan targets, numbered per user
//! - `scan` - scans, numbered per user
//! - `vuln` - findings, numbered per scan
//!
//! Child inserts and soft-deletes update the parent's counter
//! (`num_domains`, `num_scans`, `num_vulns`) in the same transaction.
//!
//! # Example
//!
//! ```ignore
//! use vigil_server_db::{create_pool, run_migrations, UserRepository};
//!
//! let pool = create_pool("sqlite:./vigil.db").await?;
//! run_migrations(&pool).await?;
//!
//! let users = UserRepository::new(pool.clone());
//! if let Some(user) = users.authenticate("a@b.com", &password).await? {
//!     println!("welcome {}", user.email);
//! }
//! ```

pub mod domain;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod role;
pub mod scan;
pub mod user;
pub mod vuln;

#[cfg(test)]
pub mod testing;

pub use domain::{Domain, DomainRepository, DomainStore};
pub use error::{DbError, Result};
pub use migrations::run_migrations;
pub use pool::create_pool;
pub use role::{RoleRepository, RoleStore};
pub use scan::{Scan, ScanRepository, ScanStatus, ScanStore};
pub use user::{UserRepository, UserStore};
pub use vuln::{Vulnerability, VulnerabilityRepository, VulnerabilityStore};
