use crate::access::SESSION_ID_HEADER;
use crate::dispatcher::JsonRpcDispatcher;
use crate::session::SessionRegistry;
use crate::sse::{SseBroadcaster, SseEvent};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

/// Session id requested by the client, if any.
pub(crate) fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
}

/// Create a JSON response with the provided status.
pub(crate) fn json_response_with_status<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| (status, "Failed to create response").into_response()),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response").into_response(),
    }
}

/// Attach the resolved session id.
pub(crate) fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// `POST /mcp`: resolve the session, dispatch the JSON-RPC body, answer with
/// the response and the session id, then tell the session's SSE subscribers
/// that a request was handled.
pub async fn handle_mcp_request(
    registry: &SessionRegistry,
    broadcaster: &SseBroadcaster,
    dispatcher: &JsonRpcDispatcher,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let requested = session_id_from_headers(headers);
    let session = registry.get_or_create(requested.as_deref());

    let dispatched = dispatcher.handle_bytes(body).await;
    debug!(
        session_id = %session.id,
        method = ?dispatched.method,
        status = dispatched.status.as_u16(),
        "Handled MCP request"
    );

    let response = with_session_header(
        json_response_with_status(dispatched.status, &dispatched.response),
        &session.id,
    );

    broadcaster.broadcast_to(
        &session,
        SseEvent::request(dispatched.method.as_deref(), &session.id),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RequestHandler;
    use crate::error::HandlerError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct Pong;

    #[async_trait]
    impl RequestHandler for Pong {
        async fn handle(&self, method: &str, _params: Value) -> Result<Value, HandlerError> {
            match method {
                "ping" => Ok(json!({"pong": true})),
                other => Err(HandlerError::new(format!("Unknown method: {}", other))),
            }
        }
    }

    fn parts() -> (Arc<SessionRegistry>, SseBroadcaster, JsonRpcDispatcher) {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = SseBroadcaster::new(Arc::clone(&registry));
        (registry, broadcaster, JsonRpcDispatcher::new(Arc::new(Pong)))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn session_header_is_trimmed_and_blank_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from_headers(&headers), None);
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id_from_headers(&headers), None);
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static(" abc "));
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn new_session_is_created_and_echoed() {
        let (registry, broadcaster, dispatcher) = parts();
        let body = br#"{"jsonrpc":"2.0","method":"ping","id":7}"#;
        let response =
            handle_mcp_request(&registry, &broadcaster, &dispatcher, &HeaderMap::new(), body)
                .await;

        assert_eq!(response.status(), StatusCode::OK);
        let session_id = response.headers()[SESSION_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        assert!(registry.get(&session_id).is_some());
        assert_eq!(
            body_json(response).await,
            json!({"jsonrpc": "2.0", "result": {"pong": true}, "id": 7})
        );
    }

    #[tokio::test]
    async fn known_session_is_reused_and_notified() {
        let (registry, broadcaster, dispatcher) = parts();
        let session = registry.get_or_create(None);
        let mut sub = broadcaster.subscribe(&session);
        assert_eq!(sub.recv().await.unwrap().event_type, "connection");

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_str(&session.id).unwrap());
        let response = handle_mcp_request(
            &registry,
            &broadcaster,
            &dispatcher,
            &headers,
            br#"{"jsonrpc":"2.0","method":"ping","id":1}"#,
        )
        .await;

        assert_eq!(response.headers()[SESSION_ID_HEADER], session.id.as_str());
        assert_eq!(registry.count(), 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type, "request");
        assert_eq!(event.get("method"), Some(&json!("ping")));
        assert_eq!(event.get("sessionId"), Some(&json!(session.id)));
    }

    #[tokio::test]
    async fn invalid_envelope_still_gets_session_header() {
        let (registry, broadcaster, dispatcher) = parts();
        let response = handle_mcp_request(
            &registry,
            &broadcaster,
            &dispatcher,
            &HeaderMap::new(),
            br#"{"method":"ping","id":1}"#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key(SESSION_ID_HEADER));
        let value = body_json(response).await;
        assert_eq!(value["error"]["code"], -32600);
        assert_eq!(value["id"], 1);
    }
}
