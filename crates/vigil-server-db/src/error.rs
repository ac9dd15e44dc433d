// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Translate constraint failures on a write into domain errors.
///
/// Unique violations become `Conflict`, foreign key violations become
/// `NotFound`; everything else is passed through unchanged.
pub(crate) fn map_write_error(e: sqlx::Error, conflict: &str, missing: &str) -> DbError {
	match e {
		sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
			DbError::Conflict(conflict.to_string())
		}
		sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
			DbError::NotFound(missing.to_string())
		}
		_ => DbError::Sqlx(e),
	}
}
