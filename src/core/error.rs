use http::StatusCode;
use serde::Serialize;

/// The Matrix error taxonomy this server can produce, mapped directly to an
/// `errcode`/HTTP status pair on the wire. Grounded in the status-code
/// dispatch of a conduit-family `Error::status_code`/`Error::kind`, trimmed
/// down to the handful of kinds a minimal homeserver actually raises.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("missing access token")]
	MissingToken,
	#[error("unknown access token")]
	UnknownToken,
	#[error("forbidden: {0}")]
	Forbidden(&'static str),
	#[error("not found: {0}")]
	NotFound(&'static str),
	#[error("bad json: {0}")]
	BadJson(String),
	#[error("unrecognized request")]
	Unrecognized,
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Mxid(#[from] ruma::IdParseError),
	#[error(transparent)]
	Config(#[from] figment::Error),
	#[error("{0}")]
	Unknown(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	/// The Matrix `errcode` string for this error.
	#[must_use]
	pub fn errcode(&self) -> &'static str {
		match self {
			| Self::MissingToken => "M_MISSING_TOKEN",
			| Self::UnknownToken => "M_UNKNOWN_TOKEN",
			| Self::Forbidden(_) => "M_FORBIDDEN",
			| Self::NotFound(_) => "M_NOT_FOUND",
			| Self::BadJson(_) | Self::Json(_) => "M_BAD_JSON",
			| Self::Unrecognized => "M_UNRECOGNIZED",
			| Self::Mxid(_) => "M_INVALID_PARAM",
			| Self::Config(_) | Self::Unknown(_) => "M_UNKNOWN",
		}
	}

	#[must_use]
	pub fn status_code(&self) -> StatusCode {
		match self {
			| Self::MissingToken | Self::UnknownToken => StatusCode::UNAUTHORIZED,
			| Self::Forbidden(_) => StatusCode::FORBIDDEN,
			| Self::NotFound(_) => StatusCode::NOT_FOUND,
			| Self::BadJson(_) | Self::Json(_) | Self::Mxid(_) => StatusCode::BAD_REQUEST,
			| Self::Unrecognized => StatusCode::NOT_FOUND,
			| Self::Config(_) | Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

#[derive(Serialize)]
struct ErrorBody {
	errcode: String,
	error: String,
}

impl axum::response::IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let status = self.status_code();
		let body = ErrorBody {
			errcode: self.errcode().to_owned(),
			error: self.to_string(),
		};
		(status, axum::Json(body)).into_response()
	}
}
