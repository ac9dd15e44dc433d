// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("password is not a readable attribute")]
	PasswordNotReadable,

	#[error("Invalid user id: {0}")]
	InvalidUserId(String),
}
