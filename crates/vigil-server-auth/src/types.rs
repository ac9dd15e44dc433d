// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AuthError;

/// Unique identifier for a user.
///
/// Stored as the hyphenated UUID string in `users.id` (a 40 character column).
/// Assigned once at construction and never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
	pub fn new(id: Uuid) -> Self {
		Self(id)
	}

	/// Generate a new random ID.
	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn into_inner(self) -> Uuid {
		self.0
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for UserId {
	type Err = AuthError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| AuthError::InvalidUserId(s.to_string()))
	}
}

impl From<Uuid> for UserId {
	fn from(id: Uuid) -> Self {
		Self(id)
	}
}

impl From<UserId> for Uuid {
	fn from(id: UserId) -> Self {
		id.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::HashSet;

	#[test]
	fn test_display_is_hyphenated_uuid() {
		let id = UserId::generate();
		let s = id.to_string();
		assert_eq!(s.len(), 36);
		assert_eq!(s.parse::<UserId>().unwrap(), id);
	}

	#[test]
	fn test_parse_rejects_garbage() {
		let err = "not-a-uuid".parse::<UserId>().unwrap_err();
		assert!(matches!(err, AuthError::InvalidUserId(ref s) if s == "not-a-uuid"));
	}

	#[test]
	fn test_serde_is_transparent() {
		let id = UserId::generate();
		let json = serde_json::to_string(&id).unwrap();
		assert_eq!(json, format!("\"{id}\""));
	}

	proptest! {
		#[test]
		fn user_id_generation_is_unique(count in 1..500usize) {
			let mut ids = HashSet::new();
			for _ in 0..count {
				prop_assert!(ids.insert(UserId::generate()), "Generated duplicate UserId");
			}
		}
	}
}
