//! WebSocket surface
//!
//! One inbound task and one outbound writer task per connection. The
//! writer drains the connection's outbox (quote pushes from the market
//! service) and a small control channel (acks and protocol errors from
//! the inbound side). A protocol violation produces an error frame on
//! the offending connection only; it never tears anything else down.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use market_data::outbox::{Outbox, OutboxConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::ids::TopicId;

use crate::connection::Connection;
use crate::protocol::{
    ClientRequest, RequestAction, ServerMessage, error_code, parse_client_request,
};
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let outbox = Arc::new(Outbox::new(OutboxConfig {
        capacity: state.config.outbox_capacity,
        policy: state.config.overflow_policy,
    }));
    let connection = Arc::new(Connection::new(outbox));
    state.connections.register(Arc::clone(&connection));
    connection.mark_open();
    info!(connection = %connection.id(), "client connected");

    let (sink, stream) = socket.split();
    let (control_tx, control_rx) = mpsc::channel::<ServerMessage>(32);

    let mut writer = tokio::spawn(write_outbound(
        sink,
        Arc::clone(connection.outbox()),
        control_rx,
    ));

    let mut writer_done = false;
    tokio::select! {
        result = &mut writer => {
            // Fatal write error (or early writer exit): Open → Closing
            if let Ok(Err(err)) = result {
                debug!(connection = %connection.id(), error = %err, "outbound write failed");
            }
            writer_done = true;
        }
        _ = read_inbound(stream, &state, &connection, &control_tx) => {}
    }

    state.teardown_connection(&connection);
    if !writer_done {
        // Outbox is closed now; the writer drains and exits on its own.
        let _ = writer.await;
    }
}

async fn read_inbound(
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    connection: &Arc<Connection>,
    control_tx: &mpsc::Sender<ServerMessage>,
) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(connection = %connection.id(), error = %err, "inbound read failed");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                handle_request(state, connection, control_tx, text.as_str()).await;
            }
            Message::Close(_) => break,
            // Pings are answered by the stack; binary frames are not part
            // of the protocol and are ignored.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    outbox: Arc<Outbox>,
    mut control_rx: mpsc::Receiver<ServerMessage>,
) -> Result<(), axum::Error> {
    let mut control_open = true;
    loop {
        // Quote pushes first: the outbox is the ordered data path.
        while let Some(snapshot) = outbox.pop() {
            let frame = ServerMessage::quote(snapshot).to_json();
            sink.send(Message::Text(Utf8Bytes::from(frame))).await?;
        }
        if outbox.is_closed() {
            break;
        }

        if control_open {
            tokio::select! {
                _ = outbox.notified() => {}
                message = control_rx.recv() => match message {
                    Some(message) => {
                        sink.send(Message::Text(Utf8Bytes::from(message.to_json())))
                            .await?;
                    }
                    None => control_open = false,
                },
            }
        } else {
            outbox.notified().await;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}

async fn handle_request(
    state: &AppState,
    connection: &Arc<Connection>,
    control_tx: &mpsc::Sender<ServerMessage>,
    text: &str,
) {
    let request = match parse_client_request(text) {
        Ok(request) => request,
        Err(err) => {
            warn!(connection = %connection.id(), error = %err, "malformed client request");
            send_control(
                control_tx,
                ServerMessage::protocol_error(
                    error_code::MALFORMED_REQUEST,
                    format!("malformed request: {err}"),
                ),
            )
            .await;
            return;
        }
    };

    let topics = match validate_topics(&request) {
        Ok(topics) => topics,
        Err(error_frame) => {
            send_control(control_tx, error_frame).await;
            return;
        }
    };

    match request.action {
        RequestAction::Subscribe => {
            subscribe_topics(state, connection, control_tx, topics).await;
        }
        RequestAction::Unsubscribe => {
            for topic in &topics {
                if let Some(handle) = connection.remove_subscription(topic) {
                    state.service.unsubscribe(&handle);
                }
            }
            send_control(control_tx, ServerMessage::Unsubscribed { topics }).await;
        }
    }
}

fn validate_topics(request: &ClientRequest) -> Result<Vec<TopicId>, ServerMessage> {
    if request.topics.is_empty() {
        return Err(ServerMessage::protocol_error(
            error_code::EMPTY_TOPICS,
            "request names no topics",
        ));
    }

    request
        .topics
        .iter()
        .map(|raw| {
            TopicId::try_new(raw.clone()).ok_or_else(|| {
                ServerMessage::protocol_error(error_code::INVALID_TOPIC, "empty topic")
            })
        })
        .collect()
}

async fn subscribe_topics(
    state: &AppState,
    connection: &Arc<Connection>,
    control_tx: &mpsc::Sender<ServerMessage>,
    topics: Vec<TopicId>,
) {
    let new_topics = topics
        .iter()
        .filter(|topic| !connection.has_subscription(topic))
        .count();
    let cap = state.config.max_subscriptions_per_connection;
    if connection.subscription_count() + new_topics > cap {
        send_control(
            control_tx,
            ServerMessage::protocol_error(
                error_code::SUBSCRIPTION_LIMIT,
                format!("subscription limit ({cap}) reached"),
            ),
        )
        .await;
        return;
    }

    for topic in &topics {
        // Idempotent per topic: an existing subscription is left as-is
        if connection.has_subscription(topic) {
            continue;
        }
        let handle = state.service.subscribe(
            topic.clone(),
            connection.subscriber_id(),
            Arc::clone(connection.outbox()),
        );
        if !connection.add_subscription(topic.clone(), handle.clone()) {
            // Teardown raced this request; release immediately
            state.service.unsubscribe(&handle);
            return;
        }
    }

    send_control(control_tx, ServerMessage::Subscribed { topics }).await;
}

async fn send_control(control_tx: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    // A dropped receiver means the writer is gone and teardown is already
    // under way; nothing to report to.
    let _ = control_tx.send(message).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use market_data::service::MarketService;
    use market_data::feed::FeedUpdate;

    fn make_state(max_subscriptions: usize) -> AppState {
        let config = GatewayConfig {
            max_subscriptions_per_connection: max_subscriptions,
            ..GatewayConfig::default()
        };
        AppState::new(Arc::new(MarketService::new()), config)
    }

    fn make_connection(state: &AppState) -> Arc<Connection> {
        let outbox = Arc::new(Outbox::new(OutboxConfig {
            capacity: state.config.outbox_capacity,
            policy: state.config.overflow_policy,
        }));
        let connection = Arc::new(Connection::new(outbox));
        state.connections.register(Arc::clone(&connection));
        connection.mark_open();
        connection
    }

    fn make_update(topic: &str, price: f64, seq: u64) -> FeedUpdate {
        FeedUpdate {
            topic: topic.to_string(),
            price,
            size: 1.0,
            sequence: seq,
            timestamp: 0,
        }
    }

    async fn request(
        state: &AppState,
        connection: &Arc<Connection>,
        control_tx: &mpsc::Sender<ServerMessage>,
        text: &str,
    ) {
        handle_request(state, connection, control_tx, text).await;
    }

    #[tokio::test]
    async fn test_subscribe_acks_and_seeds() {
        let state = make_state(8);
        state.service.ingest(make_update("X", 10.0, 1));
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["X"]}"#).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Subscribed { .. }
        ));
        // Seed snapshot flowed through the outbox
        let seed = connection.outbox().pop().unwrap();
        assert_eq!(seed.sequence, 1);
        assert!(connection.has_subscription(&TopicId::new("X")));
    }

    #[tokio::test]
    async fn test_malformed_request_error_frame() {
        let state = make_state(8);
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, "not json at all").await;

        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => {
                assert_eq!(code, error_code::MALFORMED_REQUEST);
            }
            other => panic!("expected error frame, got {other:?}"),
        }
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_topics_rejected() {
        let state = make_state(8);
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":[]}"#).await;

        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, error_code::EMPTY_TOPICS),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_topic_rejected() {
        let state = make_state(8);
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["X",""]}"#).await;

        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, error_code::INVALID_TOPIC),
            other => panic!("expected error frame, got {other:?}"),
        }
        // Nothing was registered for the partially-valid request
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_limit_enforced() {
        let state = make_state(1);
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["X"]}"#).await;
        let _ = rx.recv().await;

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["Y"]}"#).await;
        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => {
                assert_eq!(code, error_code::SUBSCRIPTION_LIMIT)
            }
            other => panic!("expected error frame, got {other:?}"),
        }
        assert_eq!(connection.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_is_idempotent() {
        let state = make_state(8);
        state.service.ingest(make_update("X", 10.0, 1));
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["X"]}"#).await;
        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["X"]}"#).await;

        let _ = rx.recv().await;
        let _ = rx.recv().await;
        // Seeded exactly once despite the duplicate request
        assert_eq!(connection.outbox().len(), 1);
        assert_eq!(
            state.service.subscriber_count(&TopicId::new("X")),
            1
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let state = make_state(8);
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"subscribe","topics":["X"]}"#).await;
        let _ = rx.recv().await;

        request(&state, &connection, &tx, r#"{"action":"unsubscribe","topics":["X"]}"#).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Unsubscribed { .. }
        ));

        state.service.ingest(make_update("X", 10.0, 1));
        assert!(connection.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_topic_is_noop() {
        let state = make_state(8);
        let connection = make_connection(&state);
        let (tx, mut rx) = mpsc::channel(8);

        request(&state, &connection, &tx, r#"{"action":"unsubscribe","topics":["X"]}"#).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Unsubscribed { .. }
        ));
    }
}
