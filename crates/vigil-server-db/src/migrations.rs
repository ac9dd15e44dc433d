// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema migrations for the Vigil tables.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const MIGRATIONS: &[(&str, &str)] = &[
	(
		"001_users_roles",
		include_str!("../migrations/001_users_roles.sql"),
	),
	("002_domains", include_str!("../migrations/002_domains.sql")),
	("003_scans", include_str!("../migrations/003_scans.sql")),
	("004_vulns", include_str!("../migrations/004_vulns.sql")),
];

/// Run all database migrations (001-004).
///
/// # Note
/// Every statement is `IF NOT EXISTS`, so this is safe to run on each start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for (name, sql) in MIGRATIONS {
		for stmt in sql.split(';').filter(|s| !is_blank(s)) {
			sqlx::query(stmt).execute(pool).await?;
		}
		tracing::debug!(migration = *name, "migration applied");
	}
	Ok(())
}

fn is_blank(stmt: &str) -> bool {
	stmt
		.lines()
		.map(str::trim)
		.all(|line| line.is_empty() || line.starts_with("--"))
}
