use clap::Parser;
use palisade_core::{Config, Result, config::Args};
use palisade_service::Services;

fn main() -> Result<()> {
	let args = Args::parse();
	let config = Config::load(args.config.as_deref())?;

	palisade_core::log::init(&config);

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.expect("failed to build tokio runtime");

	runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
	let addr = format!("0.0.0.0:{}", config.port);
	let services = Services::build(&config)?;

	tracing::info!(server_name = %config.server_name, %addr, "starting palisade");

	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.map_err(|e| palisade_core::Error::Unknown(format!("failed to bind {addr}: {e}")))?;

	let router = palisade_router::build(services);

	axum::serve(listener, router)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.map_err(|e| palisade_core::Error::Unknown(format!("server error: {e}")))?;

	tracing::info!("palisade stopped");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	tracing::info!("shutdown signal received");
}
