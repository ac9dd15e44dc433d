// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential hashing configuration.

use serde::{Deserialize, Serialize};
use vigil_server_auth::{PasswordHasher, DEFAULT_ITERATIONS};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfigLayer {
	pub password_iterations: Option<u32>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.password_iterations.is_some() {
			self.password_iterations = other.password_iterations;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		AuthConfig {
			password_iterations: self.password_iterations.unwrap_or(DEFAULT_ITERATIONS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
	/// PBKDF2 rounds for newly written password hashes.
	pub password_iterations: u32,
}

impl AuthConfig {
	pub fn password_hasher(&self) -> PasswordHasher {
		PasswordHasher::new(self.password_iterations)
	}
}

impl Default for AuthConfig {
	fn default() -> Self {
		Self {
			password_iterations: DEFAULT_ITERATIONS,
		}
	}
}
