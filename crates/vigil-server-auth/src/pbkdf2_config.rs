// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! PBKDF2 cost configuration for password hashing.
//!
//! Production builds hash with [`DEFAULT_ITERATIONS`] rounds. Unit tests in
//! this crate use a much cheaper count so the suite stays fast.
//!
//! # Security Note
//!
//! The test count is intentionally weak and MUST NOT be used in production.
//! Hashes record their own iteration count, so verifying an existing hash is
//! unaffected by whatever count is configured today.

/// Production iteration count for PBKDF2-HMAC-SHA256.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Lowest iteration count accepted from configuration.
pub const MIN_ITERATIONS: u32 = 1_000;

/// Returns the iteration count appropriate for the build context.
#[inline]
pub(crate) fn default_iterations() -> u32 {
	#[cfg(test)]
	{
		MIN_ITERATIONS
	}

	#[cfg(not(test))]
	{
		DEFAULT_ITERATIONS
	}
}
