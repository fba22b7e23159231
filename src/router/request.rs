use axum::{
	extract::Request,
	middleware::Next,
	response::{IntoResponse, Response},
};
use http::{Method, StatusCode, Uri};

/// Logs the outcome of every request. Grounded in a conduit-family request
/// middleware's status-code-banded log levels, trimmed to this server's
/// single-process, no-metrics scope.
pub(crate) async fn handle(req: Request, next: Next) -> Response {
	let method = req.method().clone();
	let uri = req.uri().clone();

	let mut response = next.run(req).await;
	log_result(&method, &uri, &response);

	if response.status() == StatusCode::METHOD_NOT_ALLOWED {
		response = method_not_allowed().await;
	}
	response
}

async fn method_not_allowed() -> Response {
	(
		StatusCode::METHOD_NOT_ALLOWED,
		axum::Json(serde_json::json!({
			"errcode": "M_UNRECOGNIZED",
			"error": "Unrecognized request",
		})),
	)
		.into_response()
}

fn log_result(method: &Method, uri: &Uri, response: &Response) {
	let status = response.status();
	let code = status.as_u16();
	let reason = status.canonical_reason().unwrap_or("Unknown Reason");

	if status.is_server_error() {
		tracing::error!(%method, %uri, "{code} {reason}");
	} else if status.is_client_error() {
		tracing::debug!(%method, %uri, "{code} {reason}");
	} else {
		tracing::trace!(%method, %uri, "{code} {reason}");
	}
}

pub(crate) async fn not_found() -> Response {
	(
		StatusCode::NOT_FOUND,
		axum::Json(serde_json::json!({
			"errcode": "M_UNRECOGNIZED",
			"error": "Unrecognized request",
		})),
	)
		.into_response()
}
