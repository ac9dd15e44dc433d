// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vigil administration binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_server_auth::SecretString;
use vigil_server_config::ServerConfig;

mod commands;
mod version;

const PASSWORD_ENV: &str = "VIGIL_USER_PASSWORD";

/// Vigil server - manage the Vigil scanner database.
#[derive(Parser, Debug)]
#[command(name = "vigil-server", about = "Vigil scanner database administration", version)]
struct Args {
	/// Config file to read instead of /etc/vigil/server.toml
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Create or upgrade the database schema
	Migrate,
	/// Create a role
	CreateRole {
		name: String,
		#[arg(long)]
		description: Option<String>,
	},
	/// Create a user; the password is read from VIGIL_USER_PASSWORD
	CreateUser {
		email: String,
		#[arg(long)]
		name: Option<String>,
		#[arg(long)]
		organization: Option<String>,
	},
	/// Grant a role to a user
	GrantRole { email: String, role: String },
	/// Check a password (from VIGIL_USER_PASSWORD) against a user's stored hash
	CheckLogin { email: String },
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = match &args.config {
		Some(path) => vigil_server_config::load_config_with_file(path),
		None => vigil_server_config::load_config(),
	}
	.context("loading configuration")?;

	init_tracing(&config);

	tracing::info!(
		version = version::VERSION,
		database = %config.database.url,
		"starting vigil-server"
	);

	let pool = vigil_server_db::create_pool(&config.database.url)
		.await
		.context("opening database")?;
	vigil_server_db::run_migrations(&pool)
		.await
		.context("running migrations")?;

	match args.command {
		Command::Migrate => {
			println!("database schema is up to date");
		}
		Command::CreateRole { name, description } => {
			let role = commands::create_role(&pool, &name, description).await?;
			println!("created role '{}' (id {})", role.name, role.id);
		}
		Command::CreateUser {
			email,
			name,
			organization,
		} => {
			let password = read_password()?;
			let user = commands::create_user(
				&pool,
				&config.auth.password_hasher(),
				&email,
				&password,
				name,
				organization,
			)
			.await?;
			println!("created user {} ({})", user.email, user.id);
		}
		Command::GrantRole { email, role } => {
			if commands::grant_role(&pool, &email, &role).await? {
				println!("granted '{role}' to {email}");
			} else {
				println!("{email} already has '{role}'");
			}
		}
		Command::CheckLogin { email } => {
			let password = read_password()?;
			if commands::check_login(&pool, &email, &password).await? {
				println!("login ok for {email}");
			} else {
				anyhow::bail!("login rejected for {email}");
			}
		}
		Command::Version => {}
	}

	pool.close().await;
	Ok(())
}

fn init_tracing(config: &ServerConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let json = config.logging.json;

	tracing_subscriber::registry()
		.with(filter)
		.with(json.then(|| tracing_subscriber::fmt::layer().json()))
		.with((!json).then(tracing_subscriber::fmt::layer))
		.init();
}

fn read_password() -> Result<SecretString> {
	let value = std::env::var(PASSWORD_ENV)
		.with_context(|| format!("{PASSWORD_ENV} must be set"))?;
	Ok(SecretString::from(value))
}
