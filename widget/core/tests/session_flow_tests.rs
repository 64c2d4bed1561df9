//! End-to-end session flows
//!
//! Each test mounts a widget through `init_with` over the in-memory
//! transport, plays the backend with `MemoryServer`, and observes the
//! widget only through the `ViewUpdate`s it publishes. Time is paused so
//! the watchdog and the stream ticker run instantly and deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use tokio::sync::mpsc;

use widget_core::history::{HistoryFetchError, PageRequest};
use widget_core::messages::{
    CONNECTION_ERROR_TEXT, DEFAULT_WELCOME_TEXT, INVALID_RESPONSE_TEXT, RESEND_REQUIRED_TEXT,
    STILL_WORKING_TEXT,
};
use widget_core::transport::{memory_pair, MemoryServer, ServerConnection};
use widget_core::{
    init_with, ClientFrame, HistoryPage, HistoryProvider, HistoryRecord, InitConfig, Message,
    ReconnectPolicy, Role, ScrollDirective, ServerFrame, SessionSettings, ViewUpdate,
    WidgetConfig, WidgetHandle,
};

// =============================================================================
// Harness
// =============================================================================

type Script = VecDeque<Result<Vec<HistoryRecord>, StatusCode>>;

/// History provider that replays a fixed list of pages
#[derive(Default)]
struct ScriptedHistory {
    pages: Mutex<Script>,
    requests: Mutex<Vec<(String, PageRequest)>>,
}

impl ScriptedHistory {
    fn new(pages: impl IntoIterator<Item = Result<Vec<HistoryRecord>, StatusCode>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(String, PageRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryProvider for ScriptedHistory {
    async fn try_fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<HistoryPage, HistoryFetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((user_id.to_string(), request));
        match self.pages.lock().unwrap().pop_front() {
            Some(Ok(records)) => Ok(HistoryPage::from_newest_first(records)),
            Some(Err(status)) => Err(HistoryFetchError::Status(status)),
            None => Ok(HistoryPage::from_newest_first(Vec::new())),
        }
    }
}

/// `count` records, newest first, numbered from `first`
fn records(first: usize, count: usize) -> Vec<HistoryRecord> {
    (first..first + count)
        .rev()
        .map(|i| HistoryRecord::new(format!("q{i}"), format!("a{i}")))
        .collect()
}

struct Mounted {
    handle: WidgetHandle,
    views: mpsc::Receiver<ViewUpdate>,
    server: MemoryServer,
}

fn mount(settings: SessionSettings, history: Option<Arc<ScriptedHistory>>) -> Mounted {
    let (connector, server) = memory_pair();
    let config = WidgetConfig::new("ws://localhost:9000/chat").with_session(settings);
    let history = history.map(|h| h as Arc<dyn HistoryProvider>);
    let (handle, views) = init_with(
        &config,
        InitConfig::new("tok-1", "user-1"),
        Arc::new(connector),
        history,
    )
    .unwrap();
    Mounted {
        handle,
        views,
        server,
    }
}

/// Next update satisfying `predicate`, failing instead of hanging
async fn wait_for<F>(views: &mut mpsc::Receiver<ViewUpdate>, predicate: F) -> ViewUpdate
where
    F: Fn(&ViewUpdate) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let update = views.recv().await.expect("session stopped");
            if predicate(&update) {
                return update;
            }
        }
    })
    .await
    .expect("expected view update never arrived")
}

/// Open the widget and complete the handshake
async fn open_connected(mounted: &mut Mounted) -> ServerConnection {
    mounted.handle.open().unwrap();
    let mut conn = mounted.server.accept().await.unwrap();
    assert_eq!(
        conn.recv_frame().await,
        Some(ClientFrame::Auth {
            token: "tok-1".to_string()
        })
    );
    wait_for(&mut mounted.views, |u| u.snapshot.connected).await;
    conn
}

async fn respond(conn: &ServerConnection, answer: &str) {
    conn.send_frame(&ServerFrame::Response {
        answer: answer.to_string(),
    })
    .await
    .unwrap();
}

async fn processing(conn: &ServerConnection, message: &str) {
    conn.send_frame(&ServerFrame::Processing {
        message: message.to_string(),
    })
    .await
    .unwrap();
}

fn settled(update: &ViewUpdate) -> bool {
    !update.snapshot.is_streaming && !update.snapshot.is_waiting_for_reply
}

fn count(update: &ViewUpdate, role: Role) -> usize {
    update
        .snapshot
        .messages
        .iter()
        .filter(|m| m.role == role)
        .count()
}

// =============================================================================
// Conversation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_send_and_stream_reply() {
    let mut w = mount(SessionSettings::default(), None);
    let mut conn = open_connected(&mut w).await;

    w.handle.send("hi").unwrap();
    let waiting = wait_for(&mut w.views, |u| u.snapshot.is_waiting_for_reply).await;
    assert_eq!(
        waiting.snapshot.messages,
        vec![Message::bot(DEFAULT_WELCOME_TEXT), Message::user("hi")]
    );
    assert!(!waiting.snapshot.input_enabled());
    assert_eq!(
        conn.recv_frame().await,
        Some(ClientFrame::Query {
            query: "hi".to_string()
        })
    );

    respond(&conn, "hello").await;
    let done = wait_for(&mut w.views, |u| {
        settled(u) && u.snapshot.messages.len() == 3
    })
    .await;
    assert_eq!(
        done.snapshot.messages,
        vec![
            Message::bot(DEFAULT_WELCOME_TEXT),
            Message::user("hi"),
            Message::bot("hello"),
        ]
    );
    assert!(done.snapshot.input_enabled());

    w.handle.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_stream_publishes_every_prefix() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    respond(&conn, "héllo").await;

    let mut buffers: Vec<String> = Vec::new();
    loop {
        let update = w.views.recv().await.unwrap();
        match update.snapshot.stream_buffer {
            Some(buffer) => {
                if buffers.last() != Some(&buffer) {
                    buffers.push(buffer);
                }
            }
            None if !buffers.is_empty() => {
                assert_eq!(update.snapshot.messages.last(), Some(&Message::bot("héllo")));
                break;
            }
            None => {}
        }
    }

    // The last character arrives folded into the log
    assert_eq!(buffers, vec!["", "h", "hé", "hél", "héll"]);
}

#[tokio::test(start_paused = true)]
async fn test_processing_entry_is_singular() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    processing(&conn, "thinking").await;
    processing(&conn, "still thinking").await;

    let update = wait_for(&mut w.views, |u| {
        u.snapshot.messages.last() == Some(&Message::processing("still thinking"))
    })
    .await;
    assert_eq!(count(&update, Role::BotProcessing), 1);
    assert!(update.snapshot.is_waiting_for_reply);

    respond(&conn, "done").await;
    let done = wait_for(&mut w.views, settled).await;
    assert_eq!(count(&done, Role::BotProcessing), 0);
    assert_eq!(done.snapshot.messages.last(), Some(&Message::bot("done")));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_escalates_long_processing() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    let started = tokio::time::Instant::now();
    processing(&conn, "thinking").await;

    let update = wait_for(&mut w.views, |u| {
        u.snapshot.messages.last() == Some(&Message::processing(STILL_WORKING_TEXT))
    })
    .await;
    assert!(started.elapsed() >= SessionSettings::default().watchdog);
    assert_eq!(count(&update, Role::BotProcessing), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_frame_is_shown_verbatim() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    processing(&conn, "thinking").await;
    conn.send_frame(&ServerFrame::Error {
        message: "quota exceeded".to_string(),
    })
    .await
    .unwrap();

    let update = wait_for(&mut w.views, |u| {
        u.snapshot.messages.last() == Some(&Message::error("quota exceeded"))
    })
    .await;
    assert_eq!(count(&update, Role::BotProcessing), 0);
    assert!(update.snapshot.input_enabled());
    assert!(update.snapshot.connected);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_frame_shows_fixed_error() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    conn.send_text("not json").await.unwrap();

    let update = wait_for(&mut w.views, |u| count(u, Role::BotError) > 0).await;
    assert_eq!(count(&update, Role::BotError), 1);
    assert_eq!(
        update.snapshot.messages.last(),
        Some(&Message::error(INVALID_RESPONSE_TEXT))
    );
    assert!(!update.snapshot.is_waiting_for_reply);
    assert!(update.snapshot.connected);

    // Still usable afterwards
    respond(&conn, "recovered").await;
    let done = wait_for(&mut w.views, |u| {
        u.snapshot.messages.last() == Some(&Message::bot("recovered"))
    })
    .await;
    assert!(settled(&done));
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_queued_send_flushes_after_reconnect() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;

    conn.close().await;
    wait_for(&mut w.views, |u| !u.snapshot.connected).await;

    w.handle.send("again").unwrap();
    let mut conn = w.server.accept().await.unwrap();
    assert_eq!(
        conn.recv_frame().await,
        Some(ClientFrame::Auth {
            token: "tok-1".to_string()
        })
    );
    assert_eq!(
        conn.recv_frame().await,
        Some(ClientFrame::Query {
            query: "again".to_string()
        })
    );

    let update = wait_for(&mut w.views, |u| {
        u.snapshot.connected && u.snapshot.is_waiting_for_reply
    })
    .await;
    assert_eq!(update.snapshot.messages.last(), Some(&Message::user("again")));
    assert_eq!(w.server.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resend_policy_reports_lost_send() {
    let settings = SessionSettings {
        reconnect: ReconnectPolicy::Resend,
        ..SessionSettings::default()
    };
    let mut w = mount(settings, None);

    w.handle.send("early").unwrap();
    let update = wait_for(&mut w.views, |u| count(u, Role::BotError) > 0).await;
    assert_eq!(
        update.snapshot.messages[1..],
        [Message::user("early"), Message::error(RESEND_REQUIRED_TEXT)]
    );

    let mut conn = w.server.accept().await.unwrap();
    assert!(matches!(conn.recv_frame().await, Some(ClientFrame::Auth { .. })));
    wait_for(&mut w.views, |u| u.snapshot.connected).await;
    assert_eq!(conn.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_surfaces_generic_error() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();
    processing(&conn, "thinking").await;

    conn.fail("socket reset").await;

    let update = wait_for(&mut w.views, |u| !u.snapshot.connected).await;
    assert_eq!(
        update.snapshot.messages.last(),
        Some(&Message::error(CONNECTION_ERROR_TEXT))
    );
    assert_eq!(count(&update, Role::BotProcessing), 0);
    assert!(update.snapshot.input_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_close_mid_stream_keeps_full_answer() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    respond(&conn, "a long answer").await;
    conn.close().await;

    let update = wait_for(&mut w.views, |u| !u.snapshot.connected).await;
    assert!(!update.snapshot.is_streaming);
    assert_eq!(
        update.snapshot.messages.last(),
        Some(&Message::bot("a long answer"))
    );
}

// =============================================================================
// History
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_history_pages_until_short_page() {
    let history = ScriptedHistory::new([Ok(records(3, 8)), Ok(records(0, 3))]);
    let mut w = mount(SessionSettings::default(), Some(Arc::clone(&history)));

    w.handle.open().unwrap();
    let first = wait_for(&mut w.views, |u| {
        !u.snapshot.is_loading_history && u.snapshot.messages.len() > 1
    })
    .await;
    assert_eq!(first.scroll, ScrollDirective::Bottom);
    assert!(first.snapshot.has_more_history);
    assert_eq!(first.snapshot.messages.len(), 1 + 16);
    assert_eq!(first.snapshot.messages[0], Message::user("q3"));
    assert_eq!(first.snapshot.messages[16], Message::bot(DEFAULT_WELCOME_TEXT));

    w.handle.scroll_to_top(640.0).unwrap();
    let second = wait_for(&mut w.views, |u| {
        !u.snapshot.is_loading_history && u.snapshot.messages.len() > 17
    })
    .await;
    assert_eq!(
        second.scroll,
        ScrollDirective::PreserveAnchor {
            previous_content_height: 640.0
        }
    );
    assert!(!second.snapshot.has_more_history);
    assert_eq!(second.snapshot.messages[0], Message::user("q0"));
    assert_eq!(second.snapshot.messages[5], Message::bot("a2"));

    // Exhausted: no third fetch
    w.handle.scroll_to_top(900.0).unwrap();
    w.handle.destroy().await;

    let requests: Vec<PageRequest> = history.requests().into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        requests,
        vec![
            PageRequest {
                offset: 0,
                limit: 8
            },
            PageRequest {
                offset: 8,
                limit: 8
            },
        ]
    );
    assert!(history.requests().iter().all(|(user, _)| user == "user-1"));
}

#[tokio::test(start_paused = true)]
async fn test_history_failure_allows_retry() {
    let history = ScriptedHistory::new([
        Err(StatusCode::INTERNAL_SERVER_ERROR),
        Ok(records(0, 2)),
    ]);
    let mut w = mount(SessionSettings::default(), Some(Arc::clone(&history)));

    w.handle.open().unwrap();
    let failed = wait_for(&mut w.views, |u| !u.snapshot.is_loading_history).await;
    assert!(failed.snapshot.has_more_history);
    assert_eq!(failed.snapshot.messages, vec![Message::bot(DEFAULT_WELCOME_TEXT)]);

    w.handle.scroll_to_top(100.0).unwrap();
    let loaded = wait_for(&mut w.views, |u| u.snapshot.messages.len() == 5).await;
    assert!(!loaded.snapshot.has_more_history);

    let offsets: Vec<usize> = history.requests().iter().map(|(_, r)| r.offset).collect();
    assert_eq!(offsets, vec![0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_history_independent_of_connection() {
    let history = ScriptedHistory::new([Ok(records(0, 1))]);
    let mut w = mount(SessionSettings::default(), Some(history));
    w.server.refuse_next(1);

    w.handle.open().unwrap();
    let update = wait_for(&mut w.views, |u| {
        !u.snapshot.is_loading_history && u.snapshot.messages.contains(&Message::user("q0"))
    })
    .await;
    assert_eq!(update.snapshot.messages[0], Message::user("q0"));
    assert_eq!(update.snapshot.messages[1], Message::bot("a0"));
    assert!(!update.snapshot.has_more_history);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_destroy_closes_connection() {
    let mut w = mount(SessionSettings::default(), None);
    let mut conn = open_connected(&mut w).await;

    w.handle.destroy().await;

    assert_eq!(conn.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_without_draining_views() {
    let w = mount(SessionSettings::default(), None);
    let _views = w.views;

    // More renders than the view channel holds
    for i in 0..150 {
        w.handle.send(format!("q{i}")).unwrap();
    }

    tokio::time::timeout(Duration::from_secs(30), w.handle.destroy())
        .await
        .expect("destroy must not wait on an unread view channel");
}

#[tokio::test(start_paused = true)]
async fn test_destroy_mid_stream_without_draining_views() {
    let mut w = mount(SessionSettings::default(), None);
    let conn = open_connected(&mut w).await;
    w.handle.send("hi").unwrap();

    // A long answer produces a tick render per character
    respond(&conn, &"x".repeat(500)).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    tokio::time::timeout(Duration::from_secs(30), w.handle.destroy())
        .await
        .expect("destroy must not wait on an unread view channel");
}

#[tokio::test(start_paused = true)]
async fn test_widgets_are_independent() {
    let mut first = mount(SessionSettings::default(), None);
    let mut second = mount(SessionSettings::default(), None);
    assert_ne!(first.handle.id(), second.handle.id());

    let conn_a = open_connected(&mut first).await;
    let _conn_b = open_connected(&mut second).await;

    first.handle.send("only here").unwrap();
    respond(&conn_a, "ok").await;
    wait_for(&mut first.views, |u| {
        u.snapshot.messages.last() == Some(&Message::bot("ok"))
    })
    .await;

    second.handle.destroy().await;
    assert!(!first.handle.is_destroyed());
    first.handle.send("still alive").unwrap();
}
