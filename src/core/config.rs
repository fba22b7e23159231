use std::path::{Path, PathBuf};

use figment::{
	Figment,
	providers::{Env, Format, Toml},
};
use serde::Deserialize;

use crate::Result;

/// One statically-configured local user, loaded at process start.
///
/// There is no registration flow; every account a deployment wants must be
/// listed here. Mirrors the shape of a conduit-family `[global.users]` table,
/// trimmed to what a login-only server needs.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
	pub localpart: String,
	pub password: String,
	#[serde(default)]
	pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub server_name: String,
	#[serde(default = "default_port")]
	pub port: u16,
	#[serde(default)]
	pub users: Vec<UserConfig>,
	/// Upper bound, in bytes, on a request body this server will buffer into
	/// memory — applies chiefly to media uploads.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// An `EnvFilter` directive string, e.g. `"info"` or `"palisade=debug"`.
	#[serde(default = "default_log")]
	pub log: String,
}

const fn default_port() -> u16 { 8008 }

const fn default_max_request_size() -> usize { 20 * 1024 * 1024 }

fn default_log() -> String { String::from("info") }

impl Config {
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let mut figment = Figment::new();

		if let Some(path) = path {
			figment = figment.merge(Toml::file(path));
		}

		figment = figment.merge(Env::prefixed("HOMESERVER_").split("_"));

		Ok(figment.extract()?)
	}
}

/// `--config <path>` / `HOMESERVER_CONFIG=<path>`, mirroring a conduit-family
/// `args::parse()` entry point.
#[derive(Debug, clap::Parser)]
#[command(name = "palisade", about = "A minimal in-memory Matrix homeserver")]
pub struct Args {
	/// Path to a TOML configuration file.
	#[arg(short, long, env = "HOMESERVER_CONFIG")]
	pub config: Option<PathBuf>,
}
