// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scan entity and repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};
use vigil_server_auth::UserId;

use crate::error::{map_write_error, DbError};

/// Lifecycle state stored in `scans.status`.
///
/// Workers may write intermediate states of their own; those round-trip
/// through `Other` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanStatus {
	Enqueued,
	Running,
	Done,
	Failed,
	Other(String),
}

impl ScanStatus {
	pub fn as_str(&self) -> &str {
		match self {
			ScanStatus::Enqueued => "Enqueued",
			ScanStatus::Running => "Running",
			ScanStatus::Done => "Done",
			ScanStatus::Failed => "Failed",
			ScanStatus::Other(s) => s,
		}
	}
}

impl From<String> for ScanStatus {
	fn from(s: String) -> Self {
		match s.as_str() {
			"Enqueued" => ScanStatus::Enqueued,
			"Running" => ScanStatus::Running,
			"Done" => ScanStatus::Done,
			"Failed" => ScanStatus::Failed,
			_ => ScanStatus::Other(s),
		}
	}
}

impl From<ScanStatus> for String {
	fn from(status: ScanStatus) -> Self {
		match status {
			ScanStatus::Other(s) => s,
			known => known.as_str().to_string(),
		}
	}
}

impl std::str::FromStr for ScanStatus {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(ScanStatus::from(s.to_string()))
	}
}

impl std::fmt::Display for ScanStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One requested scan of a target URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
	pub id: i64,
	pub relative_id: i64,
	pub description: String,
	pub target_url: String,
	pub start_time: DateTime<Utc>,
	pub scan_time: Option<DateTime<Utc>>,
	pub profile: String,
	pub status: ScanStatus,
	pub deleted: bool,
	/// Identifier of the worker running the scan; empty until one picks it up.
	pub run_instance: String,
	pub num_vulns: i64,
	pub user_id: UserId,
}

impl Scan {
	pub fn new(
		relative_id: i64,
		description: impl Into<String>,
		target_url: impl Into<String>,
		profile: impl Into<String>,
		user_id: UserId,
	) -> Self {
		Self {
			id: 0,
			relative_id,
			description: description.into(),
			target_url: target_url.into(),
			start_time: Utc::now(),
			scan_time: None,
			profile: profile.into(),
			status: ScanStatus::Enqueued,
			deleted: false,
			run_instance: String::new(),
			num_vulns: 0,
			user_id,
		}
	}

	/// Stamp the completion time. `status` is left as is; callers move it
	/// to `Done` or `Failed` separately.
	pub fn done_scan(&mut self) {
		self.scan_time = Some(Utc::now());
	}
}

#[async_trait]
pub trait ScanStore: Send + Sync {
	async fn create_scan(&self, scan: Scan) -> Result<Scan, DbError>;
	async fn get_scan_by_id(&self, id: i64) -> Result<Option<Scan>, DbError>;
	async fn get_scan_by_relative_id(
		&self,
		user_id: &UserId,
		relative_id: i64,
	) -> Result<Option<Scan>, DbError>;
	async fn list_scans_for_user(&self, user_id: &UserId) -> Result<Vec<Scan>, DbError>;
	async fn update_scan_status(&self, id: i64, status: ScanStatus) -> Result<(), DbError>;
	async fn set_run_instance(&self, id: i64, run_instance: &str) -> Result<(), DbError>;
	async fn mark_scan_done(&self, id: i64) -> Result<DateTime<Utc>, DbError>;
	async fn soft_delete_scan(&self, id: i64) -> Result<bool, DbError>;
	async fn next_scan_relative_id(&self, user_id: &UserId) -> Result<i64, DbError>;
}

#[async_trait]
impl ScanStore for ScanRepository {
	async fn create_scan(&self, scan: Scan) -> Result<Scan, DbError> {
		self.create_scan(scan).await
	}

	async fn get_scan_by_id(&self, id: i64) -> Result<Option<Scan>, DbError> {
		self.get_scan_by_id(id).await
	}

	async fn get_scan_by_relative_id(
		&self,
		user_id: &UserId,
		relative_id: i64,
	) -> Result<Option<Scan>, DbError> {
		self.get_scan_by_relative_id(user_id, relative_id).await
	}

	async fn list_scans_for_user(&self, user_id: &UserId) -> Result<Vec<Scan>, DbError> {
		self.list_scans_for_user(user_id).await
	}

	async fn update_scan_status(&self, id: i64, status: ScanStatus) -> Result<(), DbError> {
		self.update_scan_status(id, status).await
	}

	async fn set_run_instance(&self, id: i64, run_instance: &str) -> Result<(), DbError> {
		self.set_run_instance(id, run_instance).await
	}

	async fn mark_scan_done(&self, id: i64) -> Result<DateTime<Utc>, DbError> {
		self.mark_scan_done(id).await
	}

	async fn soft_delete_scan(&self, id: i64) -> Result<bool, DbError> {
		self.soft_delete_scan(id).await
	}

	async fn next_scan_relative_id(&self, user_id: &UserId) -> Result<i64, DbError> {
		self.next_scan_relative_id(user_id).await
	}
}

const SCAN_COLUMNS: &str = "id, relative_id, description, target_url, start_time, scan_time, \
	profile, status, deleted, run_instance, num_vulns, user_id";

#[derive(Clone)]
pub struct ScanRepository {
	pool: SqlitePool,
}

impl ScanRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a scan and bump the owner's `num_scans`.
	///
	/// # Errors
	/// - `DbError::NotFound` if the owning user does not exist.
	/// - `DbError::Conflict` if the user already has a scan with this `relative_id`.
	#[tracing::instrument(skip(self, scan), fields(user_id = %scan.user_id, relative_id = scan.relative_id))]
	pub async fn create_scan(&self, mut scan: Scan) -> Result<Scan, DbError> {
		let mut tx = self.pool.begin().await?;

		let result = sqlx::query(
			r#"
			INSERT INTO scans (
				relative_id, description, target_url, start_time, scan_time, profile,
				status, deleted, run_instance, num_vulns, user_id
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(scan.relative_id)
		.bind(&scan.description)
		.bind(&scan.target_url)
		.bind(scan.start_time.to_rfc3339())
		.bind(scan.scan_time.map(|t| t.to_rfc3339()))
		.bind(&scan.profile)
		.bind(scan.status.as_str())
		.bind(scan.deleted)
		.bind(&scan.run_instance)
		.bind(scan.num_vulns)
		.bind(scan.user_id.to_string())
		.execute(&mut *tx)
		.await
		.map_err(|e| map_write_error(e, "Scan relative_id already in use", "User not found"))?;

		if !scan.deleted {
			sqlx::query("UPDATE users SET num_scans = num_scans + 1 WHERE id = ?")
				.bind(scan.user_id.to_string())
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;

		scan.id = result.last_insert_rowid();
		tracing::debug!(scan_id = scan.id, status = %scan.status, "scan created");
		Ok(scan)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_scan_by_id(&self, id: i64) -> Result<Option<Scan>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {SCAN_COLUMNS} FROM scans WHERE id = ? AND deleted = 0"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_scan(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn get_scan_by_relative_id(
		&self,
		user_id: &UserId,
		relative_id: i64,
	) -> Result<Option<Scan>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {SCAN_COLUMNS} FROM scans \
			 WHERE user_id = ? AND relative_id = ? AND deleted = 0"
		))
		.bind(user_id.to_string())
		.bind(relative_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_scan(&r)).transpose()
	}

	/// Live scans owned by `user_id`, newest `relative_id` first.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_scans_for_user(&self, user_id: &UserId) -> Result<Vec<Scan>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {SCAN_COLUMNS} FROM scans \
			 WHERE user_id = ? AND deleted = 0 ORDER BY relative_id DESC"
		))
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_scan).collect()
	}

	#[tracing::instrument(skip(self), fields(status = %status))]
	pub async fn update_scan_status(&self, id: i64, status: ScanStatus) -> Result<(), DbError> {
		let result = sqlx::query("UPDATE scans SET status = ? WHERE id = ? AND deleted = 0")
			.bind(status.as_str())
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("Scan {id}")));
		}

		tracing::info!(scan_id = id, status = %status, "scan status updated");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_run_instance(&self, id: i64, run_instance: &str) -> Result<(), DbError> {
		let result = sqlx::query("UPDATE scans SET run_instance = ? WHERE id = ? AND deleted = 0")
			.bind(run_instance)
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("Scan {id}")));
		}
		Ok(())
	}

	/// Persist [`Scan::done_scan`]: stamp `scan_time` with the current time.
	///
	/// `status` is not touched.
	#[tracing::instrument(skip(self))]
	pub async fn mark_scan_done(&self, id: i64) -> Result<DateTime<Utc>, DbError> {
		let now = Utc::now();
		let result = sqlx::query("UPDATE scans SET scan_time = ? WHERE id = ? AND deleted = 0")
			.bind(now.to_rfc3339())
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("Scan {id}")));
		}

		tracing::debug!(scan_id = id, "scan time recorded");
		Ok(now)
	}

	/// Soft-delete a scan together with its vulnerabilities.
	///
	/// The scan's `num_vulns` drops to zero and the owner's `num_scans` is
	/// decremented, all in one transaction.
	///
	/// # Returns
	/// `false` if the scan does not exist or was already deleted.
	#[tracing::instrument(skip(self))]
	pub async fn soft_delete_scan(&self, id: i64) -> Result<bool, DbError> {
		let mut tx = self.pool.begin().await?;

		let hidden =
			sqlx::query("UPDATE scans SET deleted = 1, num_vulns = 0 WHERE id = ? AND deleted = 0")
				.bind(id)
				.execute(&mut *tx)
				.await?
				.rows_affected();
		if hidden == 0 {
			return Ok(false);
		}

		let owner: String = sqlx::query("SELECT user_id FROM scans WHERE id = ?")
			.bind(id)
			.fetch_one(&mut *tx)
			.await?
			.get("user_id");

		let vulns = sqlx::query("UPDATE vulns SET deleted = 1 WHERE scan_id = ? AND deleted = 0")
			.bind(id)
			.execute(&mut *tx)
			.await?
			.rows_affected();

		sqlx::query("UPDATE users SET num_scans = num_scans - 1 WHERE id = ? AND num_scans > 0")
			.bind(&owner)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		tracing::info!(scan_id = id, user_id = %owner, vulns, "scan soft-deleted");
		Ok(true)
	}

	/// One past the highest scan `relative_id` the user has ever used.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn next_scan_relative_id(&self, user_id: &UserId) -> Result<i64, DbError> {
		let next: i64 = sqlx::query(
			"SELECT COALESCE(MAX(relative_id), 0) + 1 AS next FROM scans WHERE user_id = ?",
		)
		.bind(user_id.to_string())
		.fetch_one(&self.pool)
		.await?
		.get("next");

		Ok(next)
	}
}

fn parse_time(value: &str, column: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

fn row_to_scan(row: &sqlx::sqlite::SqliteRow) -> Result<Scan, DbError> {
	let start_time_str: String = row.get("start_time");
	let scan_time_str: Option<String> = row.get("scan_time");
	let status_str: String = row.get("status");
	let user_id_str: String = row.get("user_id");

	let status = ScanStatus::from(status_str);
	let user_id = user_id_str
		.parse::<UserId>()
		.map_err(|e| DbError::Internal(format!("Invalid user id: {e}")))?;

	Ok(Scan {
		id: row.get("id"),
		relative_id: row.get("relative_id"),
		description: row.get("description"),
		target_url: row.get("target_url"),
		start_time: parse_time(&start_time_str, "start_time")?,
		scan_time: scan_time_str
			.map(|s| parse_time(&s, "scan_time"))
			.transpose()?,
		profile: row.get("profile"),
		status,
		deleted: row.get("deleted"),
		run_instance: row.get("run_instance"),
		num_vulns: row.get("num_vulns"),
		user_id,
	})
}
