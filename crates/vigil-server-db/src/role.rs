// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role repository and the `user_roles` association.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use vigil_server_auth::{Role, User, UserId};

use crate::error::{map_write_error, DbError};
use crate::user::row_to_user;

#[async_trait]
pub trait RoleStore: Send + Sync {
	async fn create_role(&self, role: Role) -> Result<Role, DbError>;
	async fn get_role_by_id(&self, id: i64) -> Result<Option<Role>, DbError>;
	async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, DbError>;
	async fn list_roles(&self) -> Result<Vec<Role>, DbError>;
	async fn add_role_to_user(&self, user_id: &UserId, role_id: i64) -> Result<bool, DbError>;
	async fn remove_role_from_user(&self, user_id: &UserId, role_id: i64)
		-> Result<bool, DbError>;
	async fn list_roles_for_user(&self, user_id: &UserId) -> Result<Vec<Role>, DbError>;
	async fn list_users_for_role(&self, role_id: i64) -> Result<Vec<User>, DbError>;
}

#[async_trait]
impl RoleStore for RoleRepository {
	async fn create_role(&self, role: Role) -> Result<Role, DbError> {
		self.create_role(role).await
	}

	async fn get_role_by_id(&self, id: i64) -> Result<Option<Role>, DbError> {
		self.get_role_by_id(id).await
	}

	async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, DbError> {
		self.get_role_by_name(name).await
	}

	async fn list_roles(&self) -> Result<Vec<Role>, DbError> {
		self.list_roles().await
	}

	async fn add_role_to_user(&self, user_id: &UserId, role_id: i64) -> Result<bool, DbError> {
		self.add_role_to_user(user_id, role_id).await
	}

	async fn remove_role_from_user(
		&self,
		user_id: &UserId,
		role_id: i64,
	) -> Result<bool, DbError> {
		self.remove_role_from_user(user_id, role_id).await
	}

	async fn list_roles_for_user(&self, user_id: &UserId) -> Result<Vec<Role>, DbError> {
		self.list_roles_for_user(user_id).await
	}

	async fn list_users_for_role(&self, role_id: i64) -> Result<Vec<User>, DbError> {
		self.list_users_for_role(role_id).await
	}
}

#[derive(Clone)]
pub struct RoleRepository {
	pool: SqlitePool,
}

impl RoleRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a role and return it with its assigned id.
	///
	/// # Errors
	/// Returns `DbError::Conflict` if a role with the same name exists.
	#[tracing::instrument(skip(self, role), fields(role = %role.name))]
	pub async fn create_role(&self, mut role: Role) -> Result<Role, DbError> {
		let result = sqlx::query("INSERT INTO roles (name, description) VALUES (?, ?)")
			.bind(&role.name)
			.bind(&role.description)
			.execute(&self.pool)
			.await
			.map_err(|e| map_write_error(e, "Role already exists", "Role not found"))?;

		role.id = result.last_insert_rowid();
		tracing::debug!(role_id = role.id, "role created");
		Ok(role)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_role_by_id(&self, id: i64) -> Result<Option<Role>, DbError> {
		let row = sqlx::query("SELECT id, name, description FROM roles WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		Ok(row.map(|r| row_to_role(&r)))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, DbError> {
		let row = sqlx::query("SELECT id, name, description FROM roles WHERE name = ?")
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;

		Ok(row.map(|r| row_to_role(&r)))
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_roles(&self) -> Result<Vec<Role>, DbError> {
		let rows = sqlx::query("SELECT id, name, description FROM roles ORDER BY name")
			.fetch_all(&self.pool)
			.await?;

		Ok(rows.iter().map(row_to_role).collect())
	}

	/// Grant a role to a user.
	///
	/// # Returns
	/// `true` if the grant was added, `false` if the user already held it.
	///
	/// # Errors
	/// Returns `DbError::NotFound` if either the user or the role is missing.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn add_role_to_user(&self, user_id: &UserId, role_id: i64) -> Result<bool, DbError> {
		let result =
			sqlx::query("INSERT OR IGNORE INTO user_roles (role_id, user_id) VALUES (?, ?)")
				.bind(role_id)
				.bind(user_id.to_string())
				.execute(&self.pool)
				.await
				.map_err(|e| map_write_error(e, "Role already granted", "User or role not found"))?;

		let added = result.rows_affected() > 0;
		if added {
			tracing::info!(user_id = %user_id, role_id, "role granted");
		}
		Ok(added)
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn remove_role_from_user(
		&self,
		user_id: &UserId,
		role_id: i64,
	) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM user_roles WHERE role_id = ? AND user_id = ?")
			.bind(role_id)
			.bind(user_id.to_string())
			.execute(&self.pool)
			.await?;

		let removed = result.rows_affected() > 0;
		if removed {
			tracing::info!(user_id = %user_id, role_id, "role revoked");
		}
		Ok(removed)
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_roles_for_user(&self, user_id: &UserId) -> Result<Vec<Role>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT r.id, r.name, r.description
			FROM roles r
			INNER JOIN user_roles ur ON ur.role_id = r.id
			WHERE ur.user_id = ?
			ORDER BY r.name
			"#,
		)
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.iter().map(row_to_role).collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_users_for_role(&self, role_id: i64) -> Result<Vec<User>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT u.id, u.email, u.name, u.password_hash, u.organization,
				u.num_domains, u.num_scans
			FROM users u
			INNER JOIN user_roles ur ON ur.user_id = u.id
			WHERE ur.role_id = ?
			ORDER BY u.email
			"#,
		)
		.bind(role_id)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_user).collect()
	}
}

fn row_to_role(row: &sqlx::sqlite::SqliteRow) -> Role {
	Role {
		id: row.get("id"),
		name: row.get("name"),
		description: row.get("description"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_test_pool, insert_user};

	#[tokio::test]
	async fn test_create_role_assigns_id() {
		let repo = RoleRepository::new(create_test_pool().await);
		let role = repo
			.create_role(Role::new("admin", Some("Administrators".to_string())))
			.await
			.unwrap();
		assert!(role.id > 0);

		let fetched = repo.get_role_by_id(role.id).await.unwrap().unwrap();
		assert_eq!(fetched, role);
		let by_name = repo.get_role_by_name("admin").await.unwrap().unwrap();
		assert_eq!(by_name.id, role.id);
	}

	#[tokio::test]
	async fn test_duplicate_role_name_conflicts() {
		let repo = RoleRepository::new(create_test_pool().await);
		repo.create_role(Role::new("admin", None)).await.unwrap();
		let err = repo.create_role(Role::new("admin", None)).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_list_roles_sorted_by_name() {
		let repo = RoleRepository::new(create_test_pool().await);
		for name in ["user", "admin", "auditor"] {
			repo.create_role(Role::new(name, None)).await.unwrap();
		}
		let names: Vec<_> = repo
			.list_roles()
			.await
			.unwrap()
			.into_iter()
			.map(|r| r.name)
			.collect();
		assert_eq!(names, vec!["admin", "auditor", "user"]);
	}

	#[tokio::test]
	async fn test_grant_and_revoke() {
		let pool = create_test_pool().await;
		let repo = RoleRepository::new(pool.clone());
		let user = insert_user(&pool, "a@b.com").await;
		let admin = repo.create_role(Role::new("admin", None)).await.unwrap();

		assert!(repo.add_role_to_user(&user.id, admin.id).await.unwrap());
		assert!(!repo.add_role_to_user(&user.id, admin.id).await.unwrap());

		let roles = repo.list_roles_for_user(&user.id).await.unwrap();
		assert_eq!(roles, vec![admin.clone()]);
		let holders = repo.list_users_for_role(admin.id).await.unwrap();
		assert_eq!(holders.len(), 1);
		assert_eq!(holders[0].id, user.id);

		assert!(repo.remove_role_from_user(&user.id, admin.id).await.unwrap());
		assert!(!repo.remove_role_from_user(&user.id, admin.id).await.unwrap());
		assert!(repo.list_roles_for_user(&user.id).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_grant_to_missing_user_is_not_found() {
		let repo = RoleRepository::new(create_test_pool().await);
		let admin = repo.create_role(Role::new("admin", None)).await.unwrap();
		let err = repo
			.add_role_to_user(&UserId::generate(), admin.id)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_grant_missing_role_is_not_found() {
		let pool = create_test_pool().await;
		let repo = RoleRepository::new(pool.clone());
		let user = insert_user(&pool, "a@b.com").await;
		let err = repo.add_role_to_user(&user.id, 999).await.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}
}
