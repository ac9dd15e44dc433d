// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use vigil_server_auth::{PasswordHasher, SecretString, User};

use crate::migrations::run_migrations;
use crate::user::UserRepository;

/// In-memory pool with the full schema applied.
///
/// A single connection, since every `:memory:` connection is its own database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str("sqlite::memory:")
		.unwrap()
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool");

	run_migrations(&pool).await.unwrap();
	pool
}

/// File-backed pool built the way production opens it, with the schema
/// applied. Needed wherever several connections must share one database.
pub async fn create_file_pool(dir: &tempfile::TempDir) -> SqlitePool {
	let url = format!("sqlite:{}", dir.path().join("vigil.db").display());
	let pool = crate::pool::create_pool(&url).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// Cheap hasher so tests do not pay production PBKDF2 cost.
pub fn test_hasher() -> PasswordHasher {
	PasswordHasher::new(1_000)
}

pub fn make_user(email: &str, password: &str) -> User {
	User::new_with_hasher(
		&test_hasher(),
		email,
		&SecretString::from(password),
		None,
		None,
	)
}

pub async fn insert_user(pool: &SqlitePool, email: &str) -> User {
	let user = make_user(email, "secret");
	UserRepository::new(pool.clone())
		.create_user(&user)
		.await
		.unwrap();
	user
}
