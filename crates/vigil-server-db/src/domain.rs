// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Domain (scan target) entity and repository.
//!
//! Domains are owned by a user and numbered per user through `relative_id`.
//! Creating or soft-deleting a domain adjusts `users.num_domains` in the same
//! transaction, so the counter always equals the number of live domains.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};
use vigil_server_auth::UserId;

use crate::error::{map_write_error, DbError};

/// A target host registered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
	/// Assigned by the database; `0` until persisted.
	pub id: i64,
	pub relative_id: i64,
	pub description: Option<String>,
	pub url: String,
	pub port: i32,
	pub ssl: bool,
	pub verification: bool,
	pub verification_code: String,
	pub deleted: bool,
	pub user_id: UserId,
}

impl Domain {
	pub fn new(
		relative_id: i64,
		url: impl Into<String>,
		port: i32,
		ssl: bool,
		user_id: UserId,
		description: Option<String>,
	) -> Self {
		Self {
			id: 0,
			relative_id,
			description,
			url: url.into(),
			port,
			ssl,
			// TODO: issue a verification code and start unverified once ownership checks exist.
			verification: true,
			verification_code: String::new(),
			deleted: false,
			user_id,
		}
	}
}

#[async_trait]
pub trait DomainStore: Send + Sync {
	async fn create_domain(&self, domain: Domain) -> Result<Domain, DbError>;
	async fn get_domain_by_id(&self, id: i64) -> Result<Option<Domain>, DbError>;
	async fn get_domain_by_relative_id(
		&self,
		user_id: &UserId,
		relative_id: i64,
	) -> Result<Option<Domain>, DbError>;
	async fn list_domains_for_user(&self, user_id: &UserId) -> Result<Vec<Domain>, DbError>;
	async fn update_domain(&self, domain: &Domain) -> Result<(), DbError>;
	async fn soft_delete_domain(&self, id: i64) -> Result<bool, DbError>;
	async fn next_domain_relative_id(&self, user_id: &UserId) -> Result<i64, DbError>;
}

#[async_trait]
impl DomainStore for DomainRepository {
	async fn create_domain(&self, domain: Domain) -> Result<Domain, DbError> {
		self.create_domain(domain).await
	}

	async fn get_domain_by_id(&self, id: i64) -> Result<Option<Domain>, DbError> {
		self.get_domain_by_id(id).await
	}

	async fn get_domain_by_relative_id(
		&self,
		user_id: &UserId,
		relative_id: i64,
	) -> Result<Option<Domain>, DbError> {
		self.get_domain_by_relative_id(user_id, relative_id).await
	}

	async fn list_domains_for_user(&self, user_id: &UserId) -> Result<Vec<Domain>, DbError> {
		self.list_domains_for_user(user_id).await
	}

	async fn update_domain(&self, domain: &Domain) -> Result<(), DbError> {
		self.update_domain(domain).await
	}

	async fn soft_delete_domain(&self, id: i64) -> Result<bool, DbError> {
		self.soft_delete_domain(id).await
	}

	async fn next_domain_relative_id(&self, user_id: &UserId) -> Result<i64, DbError> {
		self.next_domain_relative_id(user_id).await
	}
}

const DOMAIN_COLUMNS: &str = "id, relative_id, description, url, port, ssl, verification, \
	verification_code, deleted, user_id";

#[derive(Clone)]
pub struct DomainRepository {
	pool: SqlitePool,
}

impl DomainRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a domain and bump the owner's `num_domains`.
	///
	/// # Errors
	/// - `DbError::NotFound` if the owning user does not exist.
	/// - `DbError::Conflict` if the user already has a domain with this `relative_id`.
	#[tracing::instrument(skip(self, domain), fields(user_id = %domain.user_id, relative_id = domain.relative_id))]
	pub async fn create_domain(&self, mut domain: Domain) -> Result<Domain, DbError> {
		let mut tx = self.pool.begin().await?;

		let result = sqlx::query(
			r#"
			INSERT INTO domains (
				relative_id, description, url, port, ssl, verification,
				verification_code, deleted, user_id
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(domain.relative_id)
		.bind(&domain.description)
		.bind(&domain.url)
		.bind(domain.port)
		.bind(domain.ssl)
		.bind(domain.verification)
		.bind(&domain.verification_code)
		.bind(domain.deleted)
		.bind(domain.user_id.to_string())
		.execute(&mut *tx)
		.await
		.map_err(|e| map_write_error(e, "Domain relative_id already in use", "User not found"))?;

		if !domain.deleted {
			sqlx::query("UPDATE users SET num_domains = num_domains + 1 WHERE id = ?")
				.bind(domain.user_id.to_string())
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;

		domain.id = result.last_insert_rowid();
		tracing::debug!(domain_id = domain.id, "domain created");
		Ok(domain)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_domain_by_id(&self, id: i64) -> Result<Option<Domain>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {DOMAIN_COLUMNS} FROM domains WHERE id = ? AND deleted = 0"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_domain(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn get_domain_by_relative_id(
		&self,
		user_id: &UserId,
		relative_id: i64,
	) -> Result<Option<Domain>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {DOMAIN_COLUMNS} FROM domains \
			 WHERE user_id = ? AND relative_id = ? AND deleted = 0"
		))
		.bind(user_id.to_string())
		.bind(relative_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_domain(&r)).transpose()
	}

	/// Live domains owned by `user_id`, ordered by `relative_id`.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_domains_for_user(&self, user_id: &UserId) -> Result<Vec<Domain>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {DOMAIN_COLUMNS} FROM domains \
			 WHERE user_id = ? AND deleted = 0 ORDER BY relative_id"
		))
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_domain).collect()
	}

	/// Persist the editable fields: description, url, port and ssl.
	#[tracing::instrument(skip(self, domain), fields(domain_id = domain.id))]
	pub async fn update_domain(&self, domain: &Domain) -> Result<(), DbError> {
		let result = sqlx::query(
			r#"
			UPDATE domains
			SET description = ?, url = ?, port = ?, ssl = ?
			WHERE id = ? AND deleted = 0
			"#,
		)
		.bind(&domain.description)
		.bind(&domain.url)
		.bind(domain.port)
		.bind(domain.ssl)
		.bind(domain.id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("Domain {}", domain.id)));
		}
		Ok(())
	}

	/// Hide a domain from normal reads and decrement the owner's counter.
	///
	/// # Returns
	/// `false` if the domain does not exist or was already deleted.
	#[tracing::instrument(skip(self))]
	pub async fn soft_delete_domain(&self, id: i64) -> Result<bool, DbError> {
		let mut tx = self.pool.begin().await?;

		let hidden = sqlx::query("UPDATE domains SET deleted = 1 WHERE id = ? AND deleted = 0")
			.bind(id)
			.execute(&mut *tx)
			.await?
			.rows_affected();
		if hidden == 0 {
			return Ok(false);
		}

		let owner: String = sqlx::query("SELECT user_id FROM domains WHERE id = ?")
			.bind(id)
			.fetch_one(&mut *tx)
			.await?
			.get("user_id");

		sqlx::query(
			"UPDATE users SET num_domains = num_domains - 1 WHERE id = ? AND num_domains > 0",
		)
		.bind(&owner)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		tracing::info!(domain_id = id, user_id = %owner, "domain soft-deleted");
		Ok(true)
	}

	/// One past the highest `relative_id` the user has ever used.
	///
	/// Deleted domains count, so numbers are never reused.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn next_domain_relative_id(&self, user_id: &UserId) -> Result<i64, DbError> {
		let next: i64 = sqlx::query(
			"SELECT COALESCE(MAX(relative_id), 0) + 1 AS next FROM domains WHERE user_id = ?",
		)
		.bind(user_id.to_string())
		.fetch_one(&self.pool)
		.await?
		.get("next");

		Ok(next)
	}
}

fn row_to_domain(row: &sqlx::sqlite::SqliteRow) -> Result<Domain, DbError> {
	let user_id_str: String = row.get("user_id");
	let user_id = user_id_str
		.parse::<UserId>()
		.map_err(|e| DbError::Internal(format!("Invalid user id: {e}")))?;

	Ok(Domain {
		id: row.get("id"),
		relative_id: row.get("relative_id"),
		description: row.get("description"),
		url: row.get("url"),
		port: row.get("port"),
		ssl: row.get("ssl"),
		verification: row.get("verification"),
		verification_code: row.get("verification_code"),
		deleted: row.get("deleted"),
		user_id,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_file_pool, create_test_pool, insert_user};
	use crate::user::UserRepository;

	async fn num_domains(pool: &SqlitePool, user_id: &UserId) -> i64 {
		UserRepository::new(pool.clone())
			.get_user_by_id(user_id)
			.await
			.unwrap()
			.unwrap()
			.num_domains
	}

	#[test]
	fn test_new_domain_defaults() {
		let domain = Domain::new(1, "example.com", 443, true, UserId::generate(), None);
		assert_eq!(domain.id, 0);
		assert!(domain.verification);
		assert_eq!(domain.verification_code, "");
		assert!(!domain.deleted);
	}

	#[tokio::test]
	async fn test_create_and_get_domain() {
		let pool = create_test_pool().await;
		let repo = DomainRepository::new(pool.clone());
		let user = insert_user(&pool, "a@b.com").await;

		let domain = repo
			.create_domain(Domain::new(
				1,
				"example.com",
				443,
				true,
				user.id,
				Some("prod".to_string()),
			))
			.await
			.unwrap();
		assert!(domain.id > 0);

		let fetched = repo.get_domain_by_id(domain.id).await.unwrap().unwrap();
		assert_eq!(fetched, domain);
		let by_relative = repo
			.get_domain_by_relative_id(&user.id, 1)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(by_relative.id, domain.id);
		assert_eq!(num_domains(&pool, &user.id).await, 1);
	}

	#[tokio::test]
	async fn test_create_domain_for_missing_user() {
		let repo = DomainRepository::new(create_test_pool().await);
		let err = repo
			.create_domain(Domain::new(1, "x.io", 80, false, UserId::generate(), None))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_relative_id_unique_per_user_only() {
		let pool = create_test_pool().await;
		let repo = DomainRepository::new(pool.clone());
		let alice = insert_user(&pool, "a@b.com").await;
		let bob = insert_user(&pool, "b@b.com").await;

		repo
			.create_domain(Domain::new(1, "a.io", 80, false, alice.id, None))
			.await
			.unwrap();
		repo
			.create_domain(Domain::new(1, "b.io", 80, false, bob.id, None))
			.await
			.unwrap();

		let err = repo
			.create_domain(Domain::new(1, "c.io", 80, false, alice.id, None))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
		assert_eq!(num_domains(&pool, &alice.id).await, 1);
	}

	#[tokio::test]
	async fn test_update_domain() {
		let pool = create_test_pool().await;
		let repo = DomainRepository::new(pool.clone());
		let user = insert_user(&pool, "a@b.com").await;
		let mut domain = repo
			.create_domain(Domain::new(1, "a.io", 80, false, user.id, None))
			.await
			.unwrap();

		domain.url = "secure.a.io".to_string();
		domain.port = 8443;
		domain.ssl = true;
		domain.description = Some("moved".to_string());
		repo.update_domain(&domain).await.unwrap();

		let fetched = repo.get_domain_by_id(domain.id).await.unwrap().unwrap();
		assert_eq!(fetched, domain);
	}

	#[tokio::test]
	async fn test_soft_delete_hides_and_decrements_once() {
		let pool = create_test_pool().await;
		let repo = DomainRepository::new(pool.clone());
		let user = insert_user(&pool, "a@b.com").await;
		let first = repo
			.create_domain(Domain::new(1, "a.io", 80, false, user.id, None))
			.await
			.unwrap();
		repo
			.create_domain(Domain::new(2, "b.io", 80, false, user.id, None))
			.await
			.unwrap();
		assert_eq!(num_domains(&pool, &user.id).await, 2);

		assert!(repo.soft_delete_domain(first.id).await.unwrap());
		assert!(!repo.soft_delete_domain(first.id).await.unwrap());
		assert_eq!(num_domains(&pool, &user.id).await, 1);

		assert!(repo.get_domain_by_id(first.id).await.unwrap().is_none());
		let live = repo.list_domains_for_user(&user.id).await.unwrap();
		assert_eq!(live.len(), 1);
		assert_eq!(live[0].relative_id, 2);

		let err = repo.update_domain(&first).await.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_next_relative_id_skips_deleted() {
		let pool = create_test_pool().await;
		let repo = DomainRepository::new(pool.clone());
		let user = insert_user(&pool, "a@b.com").await;
		assert_eq!(repo.next_domain_relative_id(&user.id).await.unwrap(), 1);

		let domain = repo
			.create_domain(Domain::new(1, "a.io", 80, false, user.id, None))
			.await
			.unwrap();
		repo.soft_delete_domain(domain.id).await.unwrap();
		assert_eq!(repo.next_domain_relative_id(&user.id).await.unwrap(), 2);
	}


	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_deletes_keep_counter_exact() {
		let dir = tempfile::tempdir().unwrap();
		let pool = create_file_pool(&dir).await;
		let user = insert_user(&pool, "a@b.com").await;
		let repo = DomainRepository::new(pool.clone());

		let mut ids = Vec::new();
		for relative_id in 1..=20 {
			let domain = repo
				.create_domain(Domain::new(relative_id, "a.io", 443, true, user.id, None))
				.await
				.unwrap();
			ids.push(domain.id);
		}

		let handles: Vec<_> = ids
			.into_iter()
			.map(|id| {
				let repo = repo.clone();
				tokio::spawn(async move { repo.soft_delete_domain(id).await })
			})
			.collect();
		for handle in handles {
			assert!(handle.await.unwrap().unwrap());
		}

		assert_eq!(num_domains(&pool, &user.id).await, 0);
		pool.close().await;
	}
}
