//! HTTP handlers for the dashboard API.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::Json;
use futures_core::Stream;
use serde_json::json;
use tokio_stream::StreamExt;

use super::api::{
    BackendInfo, BackendsResponse, CommandResponse, ExportQuery, HealthResponse, MessagesResponse,
    SearchQuery, SendRequest, SessionsResponse,
};
use super::error::DashboardError;
use super::state::AppState;
use crate::broadcast::{BroadcastEvent, SessionStatus, SubscriberKind};
use crate::export::{session_markdown, ExportOptions};
use crate::relay::SendOutcome;
use crate::search::{search_sessions, SearchResults};

const INDEX_HTML: &str = include_str!("index.html");

/// Interval between `ping` events on idle feeds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// GET / - Dashboard page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Subscribe to one feed and prefix it with the current session list.
///
/// The subscription is opened before the snapshot so no event falls in between.
pub async fn live_feed(
    state: &AppState,
    kind: SubscriberKind,
) -> impl Stream<Item = BroadcastEvent> + Send + 'static {
    let subscription = state.hub.subscribe(kind);
    let sessions = state.registry.sessions_list().await;

    let mut head = vec![BroadcastEvent::new("sessions", json!({ "sessions": sessions }))];
    if kind == SubscriberKind::Rich {
        head.push(BroadcastEvent::new("catchup_complete", json!({})));
    }
    tokio_stream::iter(head).chain(subscription)
}

fn to_sse(event: BroadcastEvent) -> Result<Event, Infallible> {
    Ok(Event::default().event(event.name).data(event.payload.to_string()))
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(PING_INTERVAL)
        .event(Event::default().event("ping").data("{}"))
}

/// GET /events - Rich SSE feed.
pub async fn get_events_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = live_feed(&state, SubscriberKind::Rich).await;
    Sse::new(feed.map(to_sse)).keep_alive(keep_alive())
}

/// GET /events/json - Structured SSE feed.
pub async fn get_json_events_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = live_feed(&state, SubscriberKind::Structured).await;
    Sse::new(feed.map(to_sse)).keep_alive(keep_alive())
}

/// GET /sessions - Tracked sessions, most recent first.
pub async fn get_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.registry.sessions_list().await,
    })
}

/// GET /sessions/:id/messages - Full normalized history of a session.
pub async fn get_session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<MessagesResponse>, DashboardError> {
    let record = state
        .registry
        .get(&session_id)
        .ok_or_else(|| DashboardError::SessionNotFound(session_id.clone()))?;
    let messages = record.read_all().await.into_iter().map(|entry| entry.message).collect();
    Ok(Json(MessagesResponse::new(session_id, messages)))
}

/// GET /sessions/:id/status - Run and waiting state.
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, DashboardError> {
    Ok(Json(state.relay.status(&session_id).await?))
}

/// POST /sessions/:id/send - Relay a message to the agent CLI.
pub async fn post_send(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendOutcome>, DashboardError> {
    Ok(Json(state.relay.send(&session_id, &request.message).await?))
}

/// POST /sessions/:id/interrupt - Interrupt the in-flight run.
pub async fn post_interrupt(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CommandResponse>, DashboardError> {
    state.relay.interrupt(&session_id)?;
    Ok(Json(CommandResponse::success("Interrupt sent")))
}

/// POST /sessions/:id/resync - Re-read a session from the start.
pub async fn post_resync(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CommandResponse>, DashboardError> {
    let record = state
        .registry
        .get(&session_id)
        .ok_or_else(|| DashboardError::SessionNotFound(session_id.clone()))?;
    let count = record.resync().await.len();
    state.hub.session_status(&record.status().await);
    Ok(Json(CommandResponse::success(format!("Resynced {count} messages"))))
}

/// GET /backends - Enabled backends and send capability.
pub async fn get_backends(State(state): State<AppState>) -> Json<BackendsResponse> {
    let backends = state
        .registry
        .backends()
        .all()
        .iter()
        .map(|backend| BackendInfo::from(backend.as_ref()))
        .collect();
    Json(BackendsResponse {
        backends,
        send_enabled: state.relay.is_enabled(),
    })
}

/// GET /sessions/:id/export - Markdown transcript of a tracked session.
pub async fn get_session_export(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<([(HeaderName, &'static str); 1], String), DashboardError> {
    let record = state
        .registry
        .get(&session_id)
        .ok_or_else(|| DashboardError::SessionNotFound(session_id.clone()))?;
    let messages: Vec<_> = record.read_all().await.into_iter().map(|entry| entry.message).collect();
    let markdown = session_markdown(
        record.path(),
        record.backend().name(),
        &messages,
        ExportOptions {
            hide_tools: query.hide_tools,
        },
    );
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], markdown))
}

/// GET /search?q= - Phrase search over every session file on disk.
pub async fn get_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>, DashboardError> {
    let backends = state.registry.backends().clone();
    let options = query.options();
    let results = tokio::task::spawn_blocking(move || search_sessions(&backends, &query.q, &options))
        .await
        .map_err(|e| DashboardError::ServerError(format!("Search task failed: {e}")))??;
    Ok(Json(results))
}

/// GET /health - Liveness and subscriber counts.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.registry.len(),
        clients: state.hub.subscriber_count(SubscriberKind::Rich),
        json_clients: state.hub.subscriber_count(SubscriberKind::Structured),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendSet, ClaudeCodeBackend};
    use crate::broadcast::BroadcastHub;
    use crate::registry::SessionRegistry;
    use crate::relay::{MessageRelay, RelayOptions};
    use crate::render::HtmlRenderer;
    use crate::watcher::LivePipeline;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const USER_LINE: &str = r#"{"type":"user","timestamp":"2026-01-29T10:00:00Z","message":{"role":"user","content":"List files"}}"#;
    const ASSISTANT_LINE: &str = r#"{"type":"assistant","timestamp":"2026-01-29T10:00:02Z","message":{"role":"assistant","stop_reason":"end_turn","content":[{"type":"text","text":"Here they are"}]}}"#;

    async fn setup() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("-tmp-demo");
        std::fs::create_dir_all(&project).unwrap();
        let path = project.join("sess-1.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{USER_LINE}").unwrap();
        writeln!(file, "{ASSISTANT_LINE}").unwrap();

        let backends =
            BackendSet::new().with(Arc::new(ClaudeCodeBackend::new(dir.path().to_path_buf())));
        let registry = Arc::new(SessionRegistry::new(backends, 10));
        let hub = Arc::new(BroadcastHub::new());
        let pipeline = LivePipeline::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            Arc::new(HtmlRenderer::new()),
        );
        pipeline.track_session(&path).await.unwrap();

        let relay = Arc::new(MessageRelay::new(registry, hub, RelayOptions::default()));
        (dir, AppState::new(&pipeline, relay, CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_get_session_messages() {
        let (_dir, state) = setup().await;
        let Json(response) = get_session_messages(State(state), Path("sess-1".to_string()))
            .await
            .unwrap();

        assert_eq!(response.session_id, "sess-1");
        assert_eq!(response.count, 2);
        assert_eq!(response.messages[1].text(), "Here they are");
    }

    #[tokio::test]
    async fn test_get_session_export_markdown() {
        let (_dir, state) = setup().await;
        let (headers, body) = get_session_export(
            State(state.clone()),
            Path("sess-1".to_string()),
            Query(ExportQuery::default()),
        )
        .await
        .unwrap();

        assert_eq!(headers[0].1, "text/markdown; charset=utf-8");
        assert!(body.starts_with("# Claude Code Transcript"));
        assert!(body.contains("**Session:** sess-1"));
        assert!(body.contains("## Prompt 1"));
        assert!(body.contains("**Assistant:**\n\nHere they are"));

        let err = get_session_export(
            State(state),
            Path("missing".to_string()),
            Query(ExportQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_search() {
        let (_dir, state) = setup().await;
        let query = SearchQuery {
            q: "list FILES".to_string(),
            limit: None,
            include_subagents: false,
            case_sensitive: false,
            show_tools: false,
        };
        let Json(results) = get_search(State(state.clone()), Query(query)).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.sessions[0].session_id, "sess-1");
        assert!(results.sessions[0].context[0].is_match);

        let blank = SearchQuery {
            q: " ".to_string(),
            limit: None,
            include_subagents: false,
            case_sensitive: false,
            show_tools: false,
        };
        let err = get_search(State(state), Query(blank)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_session_messages_unknown() {
        let (_dir, state) = setup().await;
        let err = get_session_messages(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_sessions_and_health() {
        let (_dir, state) = setup().await;
        let Json(sessions) = get_sessions(State(state.clone())).await;
        assert_eq!(sessions.sessions.len(), 1);
        assert_eq!(sessions.sessions[0].id, "sess-1");

        let _sub = state.hub.subscribe(SubscriberKind::Structured);
        let Json(health) = get_health(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.sessions, 1);
        assert_eq!(health.clients, 0);
        assert_eq!(health.json_clients, 1);
    }

    #[tokio::test]
    async fn test_status_reports_waiting_after_history_read() {
        let (_dir, state) = setup().await;
        get_session_messages(State(state.clone()), Path("sess-1".to_string()))
            .await
            .unwrap();
        let Json(status) = get_session_status(State(state), Path("sess-1".to_string()))
            .await
            .unwrap();
        assert!(status.waiting_for_input);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_send_disabled_is_forbidden() {
        let (_dir, state) = setup().await;
        let err = post_send(
            State(state),
            Path("sess-1".to_string()),
            Json(SendRequest {
                message: "hi".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_interrupt_without_run_conflicts() {
        let (_dir, state) = setup().await;
        let err = post_interrupt(State(state), Path("sess-1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_resync() {
        let (_dir, state) = setup().await;
        let mut events = state.hub.subscribe(SubscriberKind::Rich);
        let Json(response) = post_resync(State(state), Path("sess-1".to_string()))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Resynced 2 messages");
        assert_eq!(events.try_recv().unwrap().name, "session_status");
    }

    #[tokio::test]
    async fn test_get_backends() {
        let (_dir, state) = setup().await;
        let Json(response) = get_backends(State(state)).await;
        assert_eq!(response.backends.len(), 1);
        assert_eq!(response.backends[0].name, "claude_code");
        assert!(!response.send_enabled);
    }

    #[tokio::test]
    async fn test_rich_feed_prefix_then_live() {
        let (_dir, state) = setup().await;
        let mut feed = Box::pin(live_feed(&state, SubscriberKind::Rich).await);

        let sessions = feed.next().await.unwrap();
        assert_eq!(sessions.name, "sessions");
        assert_eq!(sessions.payload["sessions"][0]["id"], "sess-1");
        assert_eq!(feed.next().await.unwrap().name, "catchup_complete");

        state.hub.session_removed("sess-1");
        let live = tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.name, "session_removed");
    }

    #[tokio::test]
    async fn test_json_feed_has_no_catchup_marker() {
        let (_dir, state) = setup().await;
        let mut feed = Box::pin(live_feed(&state, SubscriberKind::Structured).await);
        assert_eq!(feed.next().await.unwrap().name, "sessions");
        assert_eq!(state.hub.subscriber_count(SubscriberKind::Structured), 1);

        state.hub.broadcast_rich("message", json!({}));
        state.hub.broadcast_structured_event("session_catchup", json!({}));
        let next = tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.name, "session_catchup");

        drop(feed);
        assert_eq!(state.hub.subscriber_count(SubscriberKind::Structured), 0);
    }
}
