// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User repository for database operations.
//!
//! Besides CRUD this module provides the two lookups consumed by the external
//! session layer: [`UserRepository::authenticate`] (email + password) and
//! [`UserRepository::identity`] (primary key). Both signal "no such user" or
//! "wrong password" with `Ok(None)`; only store failures are errors.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use vigil_server_auth::{SecretString, User, UserId};

use crate::error::{map_write_error, DbError};

const USER_COLUMNS: &str =
	"id, email, name, password_hash, organization, num_domains, num_scans";

#[async_trait]
pub trait UserStore: Send + Sync {
	async fn create_user(&self, user: &User) -> Result<(), DbError>;
	async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, DbError>;
	async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;
	async fn update_password(&self, user: &User) -> Result<(), DbError>;
	async fn update_profile(
		&self,
		id: &UserId,
		name: Option<&str>,
		organization: Option<&str>,
	) -> Result<(), DbError>;
	async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), DbError>;
	async fn authenticate(
		&self,
		email: &str,
		password: &SecretString,
	) -> Result<Option<User>, DbError>;
	async fn identity(&self, id: &UserId) -> Result<Option<User>, DbError>;
	async fn identity_from_claims(
		&self,
		claims: &serde_json::Value,
	) -> Result<Option<User>, DbError>;
}

#[async_trait]
impl UserStore for UserRepository {
	async fn create_user(&self, user: &User) -> Result<(), DbError> {
		self.create_user(user).await
	}

	async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, DbError> {
		self.get_user_by_id(id).await
	}

	async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
		self.get_user_by_email(email).await
	}

	async fn update_password(&self, user: &User) -> Result<(), DbError> {
		self.update_password(user).await
	}

	async fn update_profile(
		&self,
		id: &UserId,
		name: Option<&str>,
		organization: Option<&str>,
	) -> Result<(), DbError> {
		self.update_profile(id, name, organization).await
	}

	async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), DbError> {
		self.list_users(limit, offset).await
	}

	async fn authenticate(
		&self,
		email: &str,
		password: &SecretString,
	) -> Result<Option<User>, DbError> {
		self.authenticate(email, password).await
	}

	async fn identity(&self, id: &UserId) -> Result<Option<User>, DbError> {
		self.identity(id).await
	}

	async fn identity_from_claims(
		&self,
		claims: &serde_json::Value,
	) -> Result<Option<User>, DbError> {
		self.identity_from_claims(claims).await
	}
}

/// Repository for user database operations.
///
/// User IDs are UUIDs stored as strings in `users.id`.
#[derive(Clone)]
pub struct UserRepository {
	pool: SqlitePool,
}

impl UserRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a new user.
	///
	/// # Errors
	/// Returns `DbError::Conflict` if the id or email is already taken.
	#[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
	pub async fn create_user(&self, user: &User) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO users (
				id, email, name, password_hash, organization, num_domains, num_scans
			) VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(user.id.to_string())
		.bind(&user.email)
		.bind(&user.name)
		.bind(&user.password_hash)
		.bind(&user.organization)
		.bind(user.num_domains)
		.bind(user.num_scans)
		.execute(&self.pool)
		.await
		.map_err(|e| map_write_error(e, "User already exists", "User not found"))?;

		tracing::debug!(user_id = %user.id, "user created");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(user_id = %id))]
	pub async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, DbError> {
		let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.map(|r| row_to_user(&r)).transpose()
	}

	/// Look up a user by exact email match.
	#[tracing::instrument(skip(self, email))]
	pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {USER_COLUMNS} FROM users WHERE email = ?"
		))
		.bind(email)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_user(&r)).transpose()
	}

	/// Persist the user's current `password_hash`.
	///
	/// Hash first with [`User::set_password`], then call this.
	#[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
	pub async fn update_password(&self, user: &User) -> Result<(), DbError> {
		let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
			.bind(&user.password_hash)
			.bind(user.id.to_string())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("User {}", user.id)));
		}

		tracing::info!(user_id = %user.id, "password updated");
		Ok(())
	}

	#[tracing::instrument(skip(self, name, organization), fields(user_id = %id))]
	pub async fn update_profile(
		&self,
		id: &UserId,
		name: Option<&str>,
		organization: Option<&str>,
	) -> Result<(), DbError> {
		let result = sqlx::query("UPDATE users SET name = ?, organization = ? WHERE id = ?")
			.bind(name)
			.bind(organization)
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("User {id}")));
		}
		Ok(())
	}

	/// List users ordered by email.
	///
	/// # Returns
	/// Tuple of (users, total_count) for pagination.
	#[tracing::instrument(skip(self))]
	pub async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), DbError> {
		let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM users")
			.fetch_one(&self.pool)
			.await?
			.get("count");

		let rows = sqlx::query(&format!(
			"SELECT {USER_COLUMNS} FROM users ORDER BY email LIMIT ? OFFSET ?"
		))
		.bind(limit)
		.bind(offset)
		.fetch_all(&self.pool)
		.await?;

		let users = rows
			.iter()
			.map(row_to_user)
			.collect::<Result<Vec<_>, _>>()?;
		Ok((users, total))
	}

	/// Resolve a login attempt.
	///
	/// # Returns
	/// The user if the email exists and the password verifies, otherwise `None`.
	#[tracing::instrument(skip(self, email, password))]
	pub async fn authenticate(
		&self,
		email: &str,
		password: &SecretString,
	) -> Result<Option<User>, DbError> {
		let Some(user) = self.get_user_by_email(email).await? else {
			tracing::debug!("authentication failed: unknown email");
			return Ok(None);
		};

		if user.verify_password(password.expose()) {
			tracing::debug!(user_id = %user.id, "authentication succeeded");
			Ok(Some(user))
		} else {
			tracing::debug!(user_id = %user.id, "authentication failed: wrong password");
			Ok(None)
		}
	}

	/// Resolve the user behind an already authenticated session.
	#[tracing::instrument(skip(self), fields(user_id = %id))]
	pub async fn identity(&self, id: &UserId) -> Result<Option<User>, DbError> {
		self.get_user_by_id(id).await
	}

	/// Resolve the user named by the `identity` claim of a decoded token.
	///
	/// A missing claim, or one that is not a UUID string, resolves to `None`.
	#[tracing::instrument(skip(self, claims))]
	pub async fn identity_from_claims(
		&self,
		claims: &serde_json::Value,
	) -> Result<Option<User>, DbError> {
		let Some(id) = claims
			.get("identity")
			.and_then(serde_json::Value::as_str)
			.and_then(|s| s.parse::<UserId>().ok())
		else {
			tracing::debug!("token claims carry no usable identity");
			return Ok(None);
		};

		self.identity(&id).await
	}
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, DbError> {
	let id_str: String = row.get("id");
	let id = id_str
		.parse::<UserId>()
		.map_err(|e| DbError::Internal(format!("Invalid user id: {e}")))?;

	Ok(User {
		id,
		email: row.get("email"),
		name: row.get("name"),
		password_hash: row.get("password_hash"),
		organization: row.get("organization"),
		num_domains: row.get("num_domains"),
		num_scans: row.get("num_scans"),
	})
}
