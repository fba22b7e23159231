use std::sync::Arc;

use axum::{
	body::{Body, to_bytes},
	http::{Request, StatusCode},
};
use palisade_core::config::{Config, UserConfig};
use palisade_service::Services;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_config() -> Config {
	Config {
		server_name: "example.invalid".to_owned(),
		port: 8008,
		users: vec![
			UserConfig { localpart: "alice".to_owned(), password: "secret".to_owned(), display_name: None },
			UserConfig { localpart: "bob".to_owned(), password: "secret".to_owned(), display_name: None },
		],
		max_request_size: 20 * 1024 * 1024,
		log: "error".to_owned(),
	}
}

async fn router() -> axum::Router {
	let services = Services::build(&test_config()).expect("services build");
	palisade_router::build(services)
}

async fn json_body(response: axum::response::Response) -> Value {
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

fn login_request(localpart: &str) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri("/_matrix/client/v3/login")
		.header("content-type", "application/json")
		.body(Body::from(
			json!({ "identifier": { "type": "m.id.user", "user": localpart }, "password": "secret" })
				.to_string(),
		))
		.unwrap()
}

async fn login(router: &axum::Router, localpart: &str) -> String {
	let response = router.clone().oneshot(login_request(localpart)).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	body["access_token"].as_str().unwrap().to_owned()
}

fn authed(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
	Request::builder()
		.method(method)
		.uri(uri)
		.header("authorization", format!("Bearer {token}"))
		.header("content-type", "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

#[tokio::test]
async fn login_then_whoami_round_trips() {
	let router = router().await;
	let token = login(&router, "alice").await;

	let response = router
		.oneshot(
			Request::builder()
				.uri("/_matrix/client/v3/account/whoami")
				.header("authorization", format!("Bearer {token}"))
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["user_id"], "@alice:example.invalid");
}

#[tokio::test]
async fn whoami_without_token_is_missing_token() {
	let router = router().await;
	let response = router
		.oneshot(
			Request::builder()
				.uri("/_matrix/client/v3/account/whoami")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	let body = json_body(response).await;
	assert_eq!(body["errcode"], "M_MISSING_TOKEN");
}

#[tokio::test]
async fn create_room_send_message_and_redact() {
	let router = router().await;
	let token = login(&router, "alice").await;

	let response = router
		.clone()
		.oneshot(authed(
			"POST",
			"/_matrix/client/v3/createRoom",
			&token,
			json!({ "preset": "private_chat", "name": "Test Room" }),
		))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let room_id = json_body(response).await["room_id"].as_str().unwrap().to_owned();

	let send_uri = format!("/_matrix/client/v3/rooms/{room_id}/send/m.room.message/txn1");
	let response = router
		.clone()
		.oneshot(authed("PUT", &send_uri, &token, json!({ "body": "hello", "msgtype": "m.text" })))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let event_id = json_body(response).await["event_id"].as_str().unwrap().to_owned();

	// Retrying the same transaction id must not create a second event.
	let replay = router.clone().oneshot(authed("PUT", &send_uri, &token, json!({ "body": "hello" }))).await.unwrap();
	let replay_event_id = json_body(replay).await["event_id"].as_str().unwrap().to_owned();
	assert_eq!(event_id, replay_event_id);

	let redact_uri = format!("/_matrix/client/v3/rooms/{room_id}/redact/{event_id}/txn2");
	let response = router
		.clone()
		.oneshot(authed("PUT", &redact_uri, &token, json!({ "reason": "spam" })))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let get_uri = format!("/_matrix/client/v3/rooms/{room_id}/event/{event_id}");
	let response = router
		.oneshot(Request::builder().uri(&get_uri).header("authorization", format!("Bearer {token}")).body(Body::empty()).unwrap())
		.await
		.unwrap();
	let body = json_body(response).await;
	assert_eq!(body["content"], json!({}));
	assert!(body["unsigned"]["redacted_because"].is_object());
}

#[tokio::test]
async fn join_rejects_uninvited_private_room() {
	let router = router().await;
	let alice_token = login(&router, "alice").await;
	let bob_token = login(&router, "bob").await;

	let response = router
		.clone()
		.oneshot(authed("POST", "/_matrix/client/v3/createRoom", &alice_token, json!({ "preset": "private_chat" })))
		.await
		.unwrap();
	let room_id = json_body(response).await["room_id"].as_str().unwrap().to_owned();

	let join_uri = format!("/_matrix/client/v3/rooms/{room_id}/join");
	let response = router.oneshot(authed("POST", &join_uri, &bob_token, json!({}))).await.unwrap();
	assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unrecognized_route_returns_m_unrecognized() {
	let router = router().await;
	let response = router
		.oneshot(Request::builder().uri("/not/a/real/route").body(Body::empty()).unwrap())
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	let body = json_body(response).await;
	assert_eq!(body["errcode"], "M_UNRECOGNIZED");
}
