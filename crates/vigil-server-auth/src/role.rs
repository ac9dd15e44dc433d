// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// A named role that can be granted to any number of users.
///
/// `id` is assigned by the database and is `0` until the role is persisted.
/// Roles are not modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
	pub id: i64,
	pub name: String,
	pub description: Option<String>,
}

impl Role {
	pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
		Self {
			id: 0,
			name: name.into(),
			description,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_role_is_unpersisted() {
		let role = Role::new("admin", Some("Full access".to_string()));
		assert_eq!(role.id, 0);
		assert_eq!(role.name, "admin");
		assert_eq!(role.description.as_deref(), Some("Full access"));
	}
}
