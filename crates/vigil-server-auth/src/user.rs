// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User account entity.
//!
//! A [`User`] owns domains and scans (see `vigil-server-db`) and carries a
//! write-only password: it can be set, which always re-hashes, and it can be
//! verified, but never read back.

use serde::Serialize;
use vigil_common_secret::SecretString;

use crate::error::AuthError;
use crate::password::PasswordHasher;
use crate::types::UserId;

/// A registered account.
///
/// `num_domains` and `num_scans` are denormalized counters. They are kept in
/// step by the database repositories, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
	pub id: UserId,
	pub email: String,
	pub name: Option<String>,
	#[serde(skip_serializing)]
	pub password_hash: String,
	pub organization: Option<String>,
	pub num_domains: i64,
	pub num_scans: i64,
}

impl User {
	/// Create a user with a fresh id, zeroed counters and a hashed password.
	pub fn new(
		email: impl Into<String>,
		password: &SecretString,
		name: Option<String>,
		organization: Option<String>,
	) -> Self {
		Self::new_with_hasher(
			&PasswordHasher::default(),
			email,
			password,
			name,
			organization,
		)
	}

	/// As [`User::new`], hashing with an explicitly configured hasher.
	pub fn new_with_hasher(
		hasher: &PasswordHasher,
		email: impl Into<String>,
		password: &SecretString,
		name: Option<String>,
		organization: Option<String>,
	) -> Self {
		Self {
			id: UserId::generate(),
			email: email.into(),
			name,
			password_hash: hasher.hash(password),
			organization,
			num_domains: 0,
			num_scans: 0,
		}
	}

	/// The plaintext password is never retained, so this always fails.
	pub fn password(&self) -> Result<SecretString, AuthError> {
		Err(AuthError::PasswordNotReadable)
	}

	pub fn set_password(&mut self, password: &SecretString) {
		self.set_password_with(&PasswordHasher::default(), password);
	}

	pub fn set_password_with(&mut self, hasher: &PasswordHasher, password: &SecretString) {
		self.password_hash = hasher.hash(password);
	}

	pub fn verify_password(&self, candidate: &str) -> bool {
		PasswordHasher::verify(&self.password_hash, candidate)
	}
}
