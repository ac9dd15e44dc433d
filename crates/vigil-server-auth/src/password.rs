// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Salted PBKDF2 password hashing.
//!
//! Hashes are stored as a single string:
//!
//! ```text
//! pbkdf2:sha256:600000$<16 char alphanumeric salt>$<hex digest>
//! ```
//!
//! This is the layout already present in `users.password_hash`, so rows
//! written before this crate existed keep verifying. The encoded string
//! carries its own digest and iteration count; verification never depends on
//! the currently configured cost.
//!
//! Verification compares hex digests in constant time. A stored hash that
//! cannot be parsed simply fails to verify.

use pbkdf2::pbkdf2_hmac;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use vigil_common_secret::SecretString;

use crate::pbkdf2_config::default_iterations;

const SALT_LEN: usize = 16;
const METHOD_PREFIX: &str = "pbkdf2";

/// HMAC digest used inside PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordDigest {
	Sha256,
	Sha512,
}

impl PasswordDigest {
	pub fn as_str(&self) -> &'static str {
		match self {
			PasswordDigest::Sha256 => "sha256",
			PasswordDigest::Sha512 => "sha512",
		}
	}

	fn derive(&self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
		match self {
			PasswordDigest::Sha256 => {
				let mut out = [0u8; 32];
				pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
				out.to_vec()
			}
			PasswordDigest::Sha512 => {
				let mut out = [0u8; 64];
				pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
				out.to_vec()
			}
		}
	}
}

impl std::str::FromStr for PasswordDigest {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"sha256" => Ok(PasswordDigest::Sha256),
			"sha512" => Ok(PasswordDigest::Sha512),
			_ => Err(format!("unsupported password digest: {s}")),
		}
	}
}

/// Produces and checks encoded password hashes.
///
/// New hashes always use PBKDF2-HMAC-SHA256 with this hasher's iteration
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
	iterations: u32,
}

impl Default for PasswordHasher {
	fn default() -> Self {
		Self::new(default_iterations())
	}
}

impl PasswordHasher {
	pub fn new(iterations: u32) -> Self {
		Self {
			iterations: iterations.max(1),
		}
	}

	pub fn iterations(&self) -> u32 {
		self.iterations
	}

	/// Hash `password` with a fresh random salt.
	pub fn hash(&self, password: &SecretString) -> String {
		let salt: String = rand::thread_rng()
			.sample_iter(&Alphanumeric)
			.take(SALT_LEN)
			.map(char::from)
			.collect();
		self.hash_with_salt(password, &salt)
	}

	fn hash_with_salt(&self, password: &SecretString, salt: &str) -> String {
		let digest = PasswordDigest::Sha256;
		let derived = digest.derive(
			password.expose().as_bytes(),
			salt.as_bytes(),
			self.iterations,
		);
		format!(
			"{METHOD_PREFIX}:{}:{}${salt}${}",
			digest.as_str(),
			self.iterations,
			hex::encode(derived)
		)
	}

	/// Check `candidate` against an encoded hash.
	///
	/// Returns `false` for a wrong password and for any hash string this
	/// module cannot interpret.
	pub fn verify(encoded: &str, candidate: &str) -> bool {
		let Some(parsed) = ParsedHash::parse(encoded) else {
			tracing::warn!("stored password hash has an unrecognised format");
			return false;
		};

		let derived = parsed.digest.derive(
			candidate.as_bytes(),
			parsed.salt.as_bytes(),
			parsed.iterations,
		);
		let computed = hex::encode(derived);
		computed.as_bytes().ct_eq(parsed.hash.as_bytes()).into()
	}
}

#[derive(Debug)]
struct ParsedHash<'a> {
	digest: PasswordDigest,
	iterations: u32,
	salt: &'a str,
	hash: &'a str,
}

impl<'a> ParsedHash<'a> {
	fn parse(encoded: &'a str) -> Option<Self> {
		let mut parts = encoded.splitn(3, '$');
		let method = parts.next()?;
		let salt = parts.next()?;
		let hash = parts.next()?;

		let mut method_parts = method.split(':');
		if method_parts.next()? != METHOD_PREFIX {
			return None;
		}
		let digest = match method_parts.next() {
			Some(name) => name.parse().ok()?,
			None => PasswordDigest::Sha256,
		};
		let iterations = match method_parts.next() {
			Some(n) => n.parse().ok().filter(|n| *n > 0)?,
			None => crate::pbkdf2_config::DEFAULT_ITERATIONS,
		};
		if method_parts.next().is_some() {
			return None;
		}

		Some(Self {
			digest,
			iterations,
			salt,
			hash,
		})
	}
}
