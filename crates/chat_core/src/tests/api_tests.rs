use super::*;

use std::collections::HashMap;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn conversations(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    assert_eq!(query.get("user_id").map(String::as_str), Some("agent-1"));
    Json(json!([
        {
            "id": "c1",
            "clientId": "client-1",
            "lastMessageAt": "2024-05-01T10:00:00Z",
            "client": { "firstName": "Awa", "lastName": "Diop" },
            "messages": [
                { "id": "m2", "content": "Vous êtes là ?", "senderId": "client-1",
                  "createdAt": "2024-05-01T10:00:00Z", "isRead": false }
            ]
        }
    ]))
}

async fn messages(Path(id): Path<String>) -> (StatusCode, Json<serde_json::Value>) {
    if id != "c1" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "not_found", "message": "conversation not found" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!([
            { "id": "m1", "content": "Bonjour", "senderId": "client-1",
              "createdAt": "2024-05-01T09:59:00Z", "isRead": true },
            { "id": "m2", "content": "Vous êtes là ?", "senderId": "client-1",
              "createdAt": "2024-05-01T10:00:00Z", "isRead": false }
        ])),
    )
}

async fn spawn_api_server() -> ChatSettings {
    let app = Router::new()
        .route("/chat/conversations", get(conversations))
        .route("/chat/conversations/:id/messages", get(messages))
        .route(
            "/broken/chat/conversations",
            get(|| async { StatusCode::BAD_GATEWAY }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    ChatSettings {
        server_url: format!("http://{addr}"),
        ..ChatSettings::default()
    }
}

#[tokio::test]
async fn lists_conversations_for_the_current_user() {
    let settings = spawn_api_server().await;
    let api = HttpConversationApi::new(&settings, UserId::from("agent-1")).expect("api");

    let conversations = api.list_conversations().await.expect("list");

    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id.as_str(), "c1");
    assert_eq!(
        conversations[0].last_message().map(|m| m.content.as_str()),
        Some("Vous êtes là ?")
    );
}

#[tokio::test]
async fn fetches_history_in_server_order() {
    let settings = spawn_api_server().await;
    let api = HttpConversationApi::new(&settings, UserId::from("agent-1")).expect("api");

    let history = api
        .list_messages(&ConversationId::from("c1"))
        .await
        .expect("history");

    let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[tokio::test]
async fn surfaces_structured_api_errors() {
    let settings = spawn_api_server().await;
    let api = HttpConversationApi::new(&settings, UserId::from("agent-1")).expect("api");

    let err = api
        .list_messages(&ConversationId::from("missing"))
        .await
        .expect_err("must fail");

    assert!(matches!(
        err,
        ChatError::Api(ApiException { code: ErrorCode::NotFound, ref message })
            if message == "conversation not found"
    ));
}

#[tokio::test]
async fn maps_bare_status_codes_when_body_is_not_an_api_error() {
    let mut settings = spawn_api_server().await;
    settings.server_url.push_str("/broken");
    let api = HttpConversationApi::new(&settings, UserId::from("agent-1")).expect("api");

    let err = api.list_conversations().await.expect_err("must fail");

    assert!(matches!(
        err,
        ChatError::Api(ApiException { code: ErrorCode::Internal, .. })
    ));
}
