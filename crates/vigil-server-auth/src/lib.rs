// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User, role and credential types for Vigil.
//!
//! This crate owns the parts of the data model that concern identity:
//!
//! - [`User`] - account entity with a write-only password
//! - [`Role`] - named role granted to users through the `user_roles` table
//! - [`UserId`] - UUID newtype used as the users primary key
//! - [`PasswordHasher`] - salted PBKDF2-SHA256 hashing and verification
//!
//! Persistence lives in `vigil-server-db`; nothing here touches the database.

mod error;
pub mod password;
mod pbkdf2_config;
pub mod role;
pub mod types;
pub mod user;

pub use error::AuthError;
pub use password::{PasswordDigest, PasswordHasher};
pub use pbkdf2_config::{DEFAULT_ITERATIONS, MIN_ITERATIONS};
pub use role::Role;
pub use types::UserId;
pub use user::User;
pub use vigil_common_secret::SecretString;
