// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account administration commands run against an open pool.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use vigil_server_auth::{PasswordHasher, Role, SecretString, User};
use vigil_server_db::{RoleRepository, UserRepository};

pub async fn create_role(
	pool: &SqlitePool,
	name: &str,
	description: Option<String>,
) -> Result<Role> {
	let role = RoleRepository::new(pool.clone())
		.create_role(Role::new(name, description))
		.await
		.with_context(|| format!("creating role '{name}'"))?;

	tracing::info!(role_id = role.id, role = %role.name, "role created");
	Ok(role)
}

pub async fn create_user(
	pool: &SqlitePool,
	hasher: &PasswordHasher,
	email: &str,
	password: &SecretString,
	name: Option<String>,
	organization: Option<String>,
) -> Result<User> {
	let user = User::new_with_hasher(hasher, email, password, name, organization);
	UserRepository::new(pool.clone())
		.create_user(&user)
		.await
		.with_context(|| format!("creating user '{email}'"))?;

	tracing::info!(user_id = %user.id, "user created");
	Ok(user)
}

/// Grant the named role to the user with `email`.
///
/// Returns `false` if the user already held the role.
pub async fn grant_role(pool: &SqlitePool, email: &str, role_name: &str) -> Result<bool> {
	let Some(user) = UserRepository::new(pool.clone())
		.get_user_by_email(email)
		.await?
	else {
		bail!("no user with email '{email}'");
	};

	let roles = RoleRepository::new(pool.clone());
	let Some(role) = roles.get_role_by_name(role_name).await? else {
		bail!("no role named '{role_name}'");
	};

	Ok(roles.add_role_to_user(&user.id, role.id).await?)
}

pub async fn check_login(pool: &SqlitePool, email: &str, password: &SecretString) -> Result<bool> {
	let user = UserRepository::new(pool.clone())
		.authenticate(email, password)
		.await?;
	Ok(user.is_some())
}
