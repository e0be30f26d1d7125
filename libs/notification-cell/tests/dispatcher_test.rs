use assert_matches::assert_matches;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::*;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn dispatcher_for(server: &MockServer) -> (TestConfig, NotificationDispatcher) {
    let test_config = TestConfig::with_supabase_url(&server.uri());
    let dispatcher = NotificationDispatcher::new(&test_config.to_app_config(), NotificationHub::new());
    (test_config, dispatcher)
}

async fn mount_insert(server: &MockServer, notification_id: &str, user_id: &str) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .and(body_partial_json(json!({"user_id": user_id, "is_delivered": false})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_response(notification_id, user_id, false)
        ])))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn offline_recipient_gets_queued_only() {
    let server = MockServer::start().await;
    let (_, dispatcher) = dispatcher_for(&server);
    let notification_id = Uuid::new_v4().to_string();

    mount_insert(&server, &notification_id, "user-1").await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let (stored, outcome) = dispatcher
        .dispatch(NewNotification::new(
            "user-1",
            NotificationType::AppointmentCreated,
            "Appointment booked",
            "Your appointment is pending confirmation",
        ))
        .await
        .unwrap();

    assert_eq!(outcome, DeliveryOutcome::QueuedOnly);
    assert!(!stored.is_delivered);
    assert_eq!(stored.id.to_string(), notification_id);
}

#[tokio::test]
async fn connected_recipient_gets_frame_and_row_is_flagged_delivered() {
    let server = MockServer::start().await;
    let (_, dispatcher) = dispatcher_for(&server);
    let notification_id = Uuid::new_v4().to_string();

    mount_insert(&server, &notification_id, "user-1").await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("id", format!("eq.{}", notification_id)))
        .and(body_partial_json(json!({"is_delivered": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut socket = dispatcher.hub().connect("user-1").await;

    let (stored, outcome) = dispatcher
        .dispatch(NewNotification::new(
            "user-1",
            NotificationType::AppointmentConfirmed,
            "Appointment confirmed",
            "See you soon",
        ))
        .await
        .unwrap();

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    assert!(stored.is_delivered);

    let frame: Value = serde_json::from_str(&socket.recv().await.unwrap()).unwrap();
    assert_eq!(frame["event"], "notification:new");
    assert_eq!(frame["data"]["id"], notification_id);
}

#[tokio::test]
async fn marking_someone_elses_notification_is_not_found() {
    let server = MockServer::start().await;
    let (test_config, dispatcher) = dispatcher_for(&server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &test_config.jwt_secret, None);
    let notification_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("id", format!("eq.{}", notification_id)))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let app = notification_routes(test_config.to_arc(), dispatcher);
    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/{}/read", notification_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let server = MockServer::start().await;
    let (test_config, dispatcher) = dispatcher_for(&server);
    let user = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&user, &test_config.jwt_secret, None);

    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .and(query_param("is_read", "eq.false"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::notification_response(&Uuid::new_v4().to_string(), &user.id, false),
            MockSupabaseResponses::notification_response(&Uuid::new_v4().to_string(), &user.id, false)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let app = notification_routes(test_config.to_arc(), dispatcher);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/?unread_only=true&limit=5")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["limit"], 5);
}

#[tokio::test]
async fn mark_read_filters_by_owner() {
    let server = MockServer::start().await;
    let (_, dispatcher) = dispatcher_for(&server);
    let notification_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("id", format!("eq.{}", notification_id)))
        .and(query_param("user_id", "eq.intruder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let result = dispatcher.mark_read(notification_id, "intruder", "token").await;

    assert_matches!(result, Err(NotificationError::NotFound));
}

#[tokio::test]
async fn malformed_ids_and_queries_use_the_error_envelope() {
    let server = MockServer::start().await;
    let (test_config, dispatcher) = dispatcher_for(&server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &test_config.jwt_secret, None);
    let app = notification_routes(test_config.to_arc(), dispatcher);

    for (verb, uri, field) in [
        ("PATCH", "/not-a-uuid/read", "path"),
        ("DELETE", "/not-a-uuid", "path"),
        ("GET", "/?limit=abc", "query"),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(verb)
                    .uri(uri)
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} {}", verb, uri);
        let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{} {}", verb, uri);
        assert_eq!(body["error"]["issues"][0]["field"], field);
    }
}
