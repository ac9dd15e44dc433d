// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vulnerability entity and repository.
//!
//! `stored_json` is the scanner's finding exactly as reported. It is stored
//! and returned verbatim, never parsed here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::{map_write_error, DbError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
	pub id: i64,
	pub relative_id: i64,
	pub stored_json: String,
	pub deleted: bool,
	pub false_positive: bool,
	pub scan_id: i64,
}

impl Vulnerability {
	pub fn new(relative_id: i64, stored_json: impl Into<String>, scan_id: i64) -> Self {
		Self {
			id: 0,
			relative_id,
			stored_json: stored_json.into(),
			deleted: false,
			false_positive: false,
			scan_id,
		}
	}
}

#[async_trait]
pub trait VulnerabilityStore: Send + Sync {
	async fn create_vulnerability(&self, vuln: Vulnerability) -> Result<Vulnerability, DbError>;
	async fn get_vulnerability_by_id(&self, id: i64) -> Result<Option<Vulnerability>, DbError>;
	async fn get_vulnerability_by_relative_id(
		&self,
		scan_id: i64,
		relative_id: i64,
	) -> Result<Option<Vulnerability>, DbError>;
	async fn list_vulnerabilities_for_scan(
		&self,
		scan_id: i64,
		include_false_positives: bool,
	) -> Result<Vec<Vulnerability>, DbError>;
	async fn set_false_positive(&self, id: i64, false_positive: bool) -> Result<(), DbError>;
	async fn soft_delete_vulnerability(&self, id: i64) -> Result<bool, DbError>;
	async fn next_vulnerability_relative_id(&self, scan_id: i64) -> Result<i64, DbError>;
}

#[async_trait]
impl VulnerabilityStore for VulnerabilityRepository {
	async fn create_vulnerability(&self, vuln: Vulnerability) -> Result<Vulnerability, DbError> {
		self.create_vulnerability(vuln).await
	}

	async fn get_vulnerability_by_id(&self, id: i64) -> Result<Option<Vulnerability>, DbError> {
		self.get_vulnerability_by_id(id).await
	}

	async fn get_vulnerability_by_relative_id(
		&self,
		scan_id: i64,
		relative_id: i64,
	) -> Result<Option<Vulnerability>, DbError> {
		self
			.get_vulnerability_by_relative_id(scan_id, relative_id)
			.await
	}

	async fn list_vulnerabilities_for_scan(
		&self,
		scan_id: i64,
		include_false_positives: bool,
	) -> Result<Vec<Vulnerability>, DbError> {
		self
			.list_vulnerabilities_for_scan(scan_id, include_false_positives)
			.await
	}

	async fn set_false_positive(&self, id: i64, false_positive: bool) -> Result<(), DbError> {
		self.set_false_positive(id, false_positive).await
	}

	async fn soft_delete_vulnerability(&self, id: i64) -> Result<bool, DbError> {
		self.soft_delete_vulnerability(id).await
	}

	async fn next_vulnerability_relative_id(&self, scan_id: i64) -> Result<i64, DbError> {
		self.next_vulnerability_relative_id(scan_id).await
	}
}

const VULN_COLUMNS: &str = "id, relative_id, stored_json, deleted, false_positive, scan_id";

#[derive(Clone)]
pub struct VulnerabilityRepository {
	pool: SqlitePool,
}

impl VulnerabilityRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Record a finding under a live scan and bump the scan's `num_vulns`.
	///
	/// # Errors
	/// - `DbError::NotFound` if the scan does not exist or is deleted.
	/// - `DbError::Conflict` if the scan already has this `relative_id`.
	#[tracing::instrument(skip(self, vuln), fields(scan_id = vuln.scan_id, relative_id = vuln.relative_id))]
	pub async fn create_vulnerability(
		&self,
		mut vuln: Vulnerability,
	) -> Result<Vulnerability, DbError> {
		let mut tx = self.pool.begin().await?;

		// The first statement must write: a deferred transaction that reads
		// first cannot be upgraded once another writer has committed.
		let result = sqlx::query(
			r#"
			INSERT INTO vulns (relative_id, stored_json, deleted, false_positive, scan_id)
			SELECT ?, ?, ?, ?, id FROM scans WHERE id = ? AND deleted = 0
			"#,
		)
		.bind(vuln.relative_id)
		.bind(&vuln.stored_json)
		.bind(vuln.deleted)
		.bind(vuln.false_positive)
		.bind(vuln.scan_id)
		.execute(&mut *tx)
		.await
		.map_err(|e| {
			map_write_error(e, "Vulnerability relative_id already in use", "Scan not found")
		})?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("Scan {}", vuln.scan_id)));
		}

		if !vuln.deleted {
			sqlx::query("UPDATE scans SET num_vulns = num_vulns + 1 WHERE id = ?")
				.bind(vuln.scan_id)
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;

		vuln.id = result.last_insert_rowid();
		tracing::debug!(vuln_id = vuln.id, "vulnerability recorded");
		Ok(vuln)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_vulnerability_by_id(&self, id: i64) -> Result<Option<Vulnerability>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {VULN_COLUMNS} FROM vulns WHERE id = ? AND deleted = 0"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|r| row_to_vuln(&r)))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_vulnerability_by_relative_id(
		&self,
		scan_id: i64,
		relative_id: i64,
	) -> Result<Option<Vulnerability>, DbError> {
		let row = sqlx::query(&format!(
			"SELECT {VULN_COLUMNS} FROM vulns \
			 WHERE scan_id = ? AND relative_id = ? AND deleted = 0"
		))
		.bind(scan_id)
		.bind(relative_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|r| row_to_vuln(&r)))
	}

	/// Live findings for a scan ordered by `relative_id`.
	///
	/// With `include_false_positives = false`, findings flagged as false
	/// positives are left out as well.
	#[tracing::instrument(skip(self))]
	pub async fn list_vulnerabilities_for_scan(
		&self,
		scan_id: i64,
		include_false_positives: bool,
	) -> Result<Vec<Vulnerability>, DbError> {
		let rows = sqlx::query(&format!(
			"SELECT {VULN_COLUMNS} FROM vulns \
			 WHERE scan_id = ? AND deleted = 0 AND (? OR false_positive = 0) \
			 ORDER BY relative_id"
		))
		.bind(scan_id)
		.bind(include_false_positives)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.iter().map(row_to_vuln).collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_false_positive(&self, id: i64, false_positive: bool) -> Result<(), DbError> {
		let result =
			sqlx::query("UPDATE vulns SET false_positive = ? WHERE id = ? AND deleted = 0")
				.bind(false_positive)
				.bind(id)
				.execute(&self.pool)
				.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("Vulnerability {id}")));
		}

		tracing::info!(vuln_id = id, false_positive, "false positive flag updated");
		Ok(())
	}

	/// Hide a finding and decrement its scan's `num_vulns`.
	///
	/// # Returns
	/// `false` if the finding does not exist or was already deleted.
	#[tracing::instrument(skip(self))]
	pub async fn soft_delete_vulnerability(&self, id: i64) -> Result<bool, DbError> {
		let mut tx = self.pool.begin().await?;

		let hidden = sqlx::query("UPDATE vulns SET deleted = 1 WHERE id = ? AND deleted = 0")
			.bind(id)
			.execute(&mut *tx)
			.await?
			.rows_affected();
		if hidden == 0 {
			return Ok(false);
		}

		let scan_id: i64 = sqlx::query("SELECT scan_id FROM vulns WHERE id = ?")
			.bind(id)
			.fetch_one(&mut *tx)
			.await?
			.get("scan_id");

		sqlx::query("UPDATE scans SET num_vulns = num_vulns - 1 WHERE id = ? AND num_vulns > 0")
			.bind(scan_id)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		tracing::info!(vuln_id = id, scan_id, "vulnerability soft-deleted");
		Ok(true)
	}

	#[tracing::instrument(skip(self))]
	pub async fn next_vulnerability_relative_id(&self, scan_id: i64) -> Result<i64, DbError> {
		let next: i64 = sqlx::query(
			"SELECT COALESCE(MAX(relative_id), 0) + 1 AS next FROM vulns WHERE scan_id = ?",
		)
		.bind(scan_id)
		.fetch_one(&self.pool)
		.await?
		.get("next");

		Ok(next)
	}
}

fn row_to_vuln(row: &sqlx::sqlite::SqliteRow) -> Vulnerability {
	Vulnerability {
		id: row.get("id"),
		relative_id: row.get("relative_id"),
		stored_json: row.get("stored_json"),
		deleted: row.get("deleted"),
		false_positive: row.get("false_positive"),
		scan_id: row.get("scan_id"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scan::{Scan, ScanRepository};
	use crate::testing::{create_file_pool, create_test_pool, insert_user};
	use proptest::prelude::*;

	async fn setup() -> (SqlitePool, ScanRepository, VulnerabilityRepository, Scan) {
		let pool = create_test_pool().await;
		let user = insert_user(&pool, "a@b.com").await;
		let scans = ScanRepository::new(pool.clone());
		let scan = scans
			.create_scan(Scan::new(1, "d", "http://x", "full", user.id))
			.await
			.unwrap();
		let vulns = VulnerabilityRepository::new(pool.clone());
		(pool, scans, vulns, scan)
	}

	async fn num_vulns(scans: &ScanRepository, scan_id: i64) -> i64 {
		scans
			.get_scan_by_id(scan_id)
			.await
			.unwrap()
			.unwrap()
			.num_vulns
	}

	#[test]
	fn test_new_vulnerability_defaults() {
		let vuln = Vulnerability::new(1, "{}", 5);
		assert!(!vuln.deleted);
		assert!(!vuln.false_positive);
		assert_eq!(vuln.scan_id, 5);
	}

	#[tokio::test]
	async fn test_create_counts_and_preserves_payload() {
		let (_pool, scans, vulns, scan) = setup().await;
		let payload = r#"{"name":"XSS","severity":"high","extra":[1,2]}"#;

		let vuln = vulns
			.create_vulnerability(Vulnerability::new(1, payload, scan.id))
			.await
			.unwrap();
		let fetched = vulns.get_vulnerability_by_id(vuln.id).await.unwrap().unwrap();
		assert_eq!(fetched.stored_json, payload);
		assert_eq!(num_vulns(&scans, scan.id).await, 1);

		let by_relative = vulns
			.get_vulnerability_by_relative_id(scan.id, 1)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(by_relative, fetched);
	}

	#[tokio::test]
	async fn test_relative_id_unique_per_scan_only() {
		let (pool, scans, vulns, scan) = setup().await;
		let other_owner = insert_user(&pool, "b@b.com").await;
		let other = scans
			.create_scan(Scan::new(1, "d", "http://y", "full", other_owner.id))
			.await
			.unwrap();

		vulns
			.create_vulnerability(Vulnerability::new(1, "{}", scan.id))
			.await
			.unwrap();
		vulns
			.create_vulnerability(Vulnerability::new(1, "{}", other.id))
			.await
			.unwrap();

		let err = vulns
			.create_vulnerability(Vulnerability::new(1, "{}", scan.id))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
		assert_eq!(num_vulns(&scans, scan.id).await, 1);
	}

	#[tokio::test]
	async fn test_create_under_missing_scan() {
		let (_pool, _scans, vulns, _scan) = setup().await;
		let err = vulns
			.create_vulnerability(Vulnerability::new(1, "{}", 9_999))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_false_positive_filtering() {
		let (_pool, _scans, vulns, scan) = setup().await;
		let first = vulns
			.create_vulnerability(Vulnerability::new(1, "{}", scan.id))
			.await
			.unwrap();
		vulns
			.create_vulnerability(Vulnerability::new(2, "{}", scan.id))
			.await
			.unwrap();

		vulns.set_false_positive(first.id, true).await.unwrap();

		let all = vulns
			.list_vulnerabilities_for_scan(scan.id, true)
			.await
			.unwrap();
		assert_eq!(all.len(), 2);
		assert!(all[0].false_positive);

		let real = vulns
			.list_vulnerabilities_for_scan(scan.id, false)
			.await
			.unwrap();
		assert_eq!(real.len(), 1);
		assert_eq!(real[0].relative_id, 2);
	}

	#[tokio::test]
	async fn test_soft_delete_decrements_scan_counter() {
		let (_pool, scans, vulns, scan) = setup().await;
		let vuln = vulns
			.create_vulnerability(Vulnerability::new(1, "{}", scan.id))
			.await
			.unwrap();

		assert!(vulns.soft_delete_vulnerability(vuln.id).await.unwrap());
		assert!(!vulns.soft_delete_vulnerability(vuln.id).await.unwrap());
		assert_eq!(num_vulns(&scans, scan.id).await, 0);
		assert!(vulns.get_vulnerability_by_id(vuln.id).await.unwrap().is_none());
		assert_eq!(
			vulns.next_vulnerability_relative_id(scan.id).await.unwrap(),
			2
		);
	}

	#[tokio::test]
	async fn test_scan_delete_cascades_to_vulnerabilities() {
		let (_pool, scans, vulns, scan) = setup().await;
		for relative_id in 1..=3 {
			vulns
				.create_vulnerability(Vulnerability::new(relative_id, "{}", scan.id))
				.await
				.unwrap();
		}

		assert!(scans.soft_delete_scan(scan.id).await.unwrap());
		assert!(vulns
			.list_vulnerabilities_for_scan(scan.id, true)
			.await
			.unwrap()
			.is_empty());

		let err = vulns
			.create_vulnerability(Vulnerability::new(4, "{}", scan.id))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_writers_all_succeed() {
		let dir = tempfile::tempdir().unwrap();
		let pool = create_file_pool(&dir).await;
		let user = insert_user(&pool, "a@b.com").await;
		let scans = ScanRepository::new(pool.clone());
		let scan = scans
			.create_scan(Scan::new(1, "d", "http://x", "full", user.id))
			.await
			.unwrap();
		let scan_id = scan.id;
		let vulns = VulnerabilityRepository::new(pool.clone());

		let inserts: Vec<_> = (1..=40)
			.map(|relative_id| {
				let vulns = vulns.clone();
				tokio::spawn(async move {
					vulns
						.create_vulnerability(Vulnerability::new(relative_id, "{}", scan_id))
						.await
				})
			})
			.collect();
		let mut ids = Vec::new();
		for handle in inserts {
			ids.push(handle.await.unwrap().unwrap().id);
		}
		assert_eq!(num_vulns(&scans, scan_id).await, 40);

		let deletes: Vec<_> = ids
			.into_iter()
			.take(15)
			.map(|id| {
				let vulns = vulns.clone();
				tokio::spawn(async move { vulns.soft_delete_vulnerability(id).await })
			})
			.collect();
		for handle in deletes {
			assert!(handle.await.unwrap().unwrap());
		}
		assert_eq!(num_vulns(&scans, scan_id).await, 25);

		pool.close().await;
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn prop_counter_tracks_live_findings(ops in proptest::collection::vec(any::<bool>(), 1..12)) {
			let rt = tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
				.unwrap();
			rt.block_on(async {
				let (_pool, scans, vulns, scan) = setup().await;
				let mut live: Vec<i64> = Vec::new();

				for (i, insert) in ops.iter().enumerate() {
					if *insert || live.is_empty() {
						let relative_id = vulns.next_vulnerability_relative_id(scan.id).await.unwrap();
						let vuln = vulns
							.create_vulnerability(Vulnerability::new(relative_id, format!("{{\"n\":{i}}}"), scan.id))
							.await
							.unwrap();
						live.push(vuln.id);
					} else {
						let id = live.remove(0);
						assert!(vulns.soft_delete_vulnerability(id).await.unwrap());
					}
				}

				assert_eq!(num_vulns(&scans, scan.id).await, live.len() as i64);
			});
		}
	}
}
