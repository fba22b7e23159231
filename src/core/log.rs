use std::env;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Config;

/// Environment flag that raises the default log level from `info` to
/// `debug`, per the "debug mode enabled by an environment flag" behavior.
const DEBUG_ENV: &str = "HOMESERVER_DEBUG";

/// Installs the global `tracing` subscriber. Mirrors a conduit-family
/// `logging::init`, trimmed to a single `fmt` layer writing to stderr — no
/// reload handles, capture buffer, or telemetry exporters, since this server
/// has no admin console or Sentry integration to feed.
pub fn init(config: &Config) {
	let directives = if env::var(DEBUG_ENV).is_ok_and(|v| v != "0" && !v.is_empty()) {
		"debug"
	} else {
		config.log.as_str()
	};

	let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));

	let fmt_layer = fmt::layer().with_target(true).with_ansi(true);

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt_layer)
		.init();
}
