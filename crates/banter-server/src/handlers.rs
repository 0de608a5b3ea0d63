//! Connection handlers.
//!
//! This module owns the shared server state and the WebSocket connection
//! lifecycle: frames in, routing engine calls, subscribed deliveries out.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::rest;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use banter_core::{
    Broker, Delivery, EngineConfig, GroupRegistry, InProcessBroker, PresenceRegistry,
    RoutingEngine, UserDirectory,
};
use banter_protocol::{codec, Frame};
use banter_store::{EventLog, MemoryLog};
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The routing engine.
    pub engine: RoutingEngine,
    /// The in-process broker; connections subscribe here.
    pub broker: Arc<InProcessBroker>,
    /// Registered identities.
    pub directory: Arc<UserDirectory>,
    /// Online identities.
    pub presence: Arc<PresenceRegistry>,
    /// Groups and membership.
    pub groups: Arc<GroupRegistry>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(UserDirectory::new());
        let presence = Arc::new(PresenceRegistry::new());
        let groups = Arc::new(GroupRegistry::new());
        let log: Arc<dyn EventLog> = Arc::new(MemoryLog::new());
        let broker = Arc::new(InProcessBroker::with_capacity(
            config.limits.broker_capacity,
        ));

        let engine = RoutingEngine::with_config(
            Arc::clone(&directory),
            Arc::clone(&presence),
            Arc::clone(&groups),
            log,
            Arc::clone(&broker) as Arc<dyn Broker>,
            EngineConfig {
                max_content_length: config.limits.max_content_length,
            },
        );

        Self {
            engine,
            broker,
            directory,
            presence,
            groups,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(rest::routes())
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("banter server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Generate session ID
    let session_id = format!(
        "sess_{:x}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    debug!(session = %session_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sink, mut stream) = socket.split();

    // Send Connected frame
    let connected = Frame::connected(&session_id);
    if let Ok(data) = codec::encode(&connected) {
        if sink.send(Message::Binary(data.to_vec())).await.is_err() {
            error!(session = %session_id, "Failed to send Connected frame");
            return;
        }
    }

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    // Track subscription task handles for cleanup
    let mut subscription_tasks: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();

    // Merged stream of deliveries from all subscribed destinations
    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel::<Arc<Delivery>>();

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Deliveries from subscribed destinations (via mpsc)
            Some(delivery) = sub_rx.recv() => {
                let frame = Frame::deliver(delivery.destination.clone(), delivery.payload.to_vec());
                if let Ok(data) = codec::encode(&frame) {
                    if sink.send(Message::Binary(data.to_vec())).await.is_err() {
                        break;
                    }
                }
            }

            // Receive from WebSocket
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);

                        // Try to decode frames
                        while let Ok(Some(frame)) = codec::decode_from::<Frame>(&mut read_buffer) {
                            if let Err(e) = handle_frame(
                                &frame,
                                &session_id,
                                &state,
                                &mut sink,
                                &mut subscription_tasks,
                                &sub_tx,
                            ).await {
                                error!(session = %session_id, error = %e, "Frame handling error");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Text(_))) => {
                        warn!(session = %session_id, "Ignoring text frame on binary protocol");
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(session = %session_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %session_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = %session_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: abort all subscription tasks
    for (_, handle) in subscription_tasks {
        handle.abort();
    }

    // Session-end signal: unbinds the identity and announces the departure
    state.engine.disconnect(&session_id).await;

    state.broker.purge_idle();
    metrics::set_active_destinations(state.broker.destination_count());

    debug!(session = %session_id, "WebSocket disconnected");
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: &Frame,
    session_id: &str,
    state: &Arc<AppState>,
    sink: &mut SplitSink<WebSocket, Message>,
    subscription_tasks: &mut HashMap<String, tokio::task::JoinHandle<()>>,
    sub_tx: &mpsc::UnboundedSender<Arc<Delivery>>,
) -> Result<()> {
    match frame {
        Frame::Subscribe { destination } => {
            debug!(session = %session_id, destination = %destination, "Subscribe request");

            if subscription_tasks.contains_key(destination) {
                send_frame(sink, &Frame::error(1003, "Already subscribed")).await?;
                return Ok(());
            }

            match state.broker.subscribe(destination) {
                Ok(mut rx) => {
                    // Forward deliveries from broadcast to the merged mpsc
                    let tx = sub_tx.clone();
                    let handle = tokio::spawn(async move {
                        loop {
                            match rx.recv().await {
                                Ok(delivery) => {
                                    if tx.send(delivery).is_err() {
                                        break; // Receiver dropped
                                    }
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            }
                        }
                    });
                    subscription_tasks.insert(destination.clone(), handle);
                    metrics::set_active_destinations(state.broker.destination_count());
                }
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Subscribe failed");
                    send_frame(sink, &Frame::error(1002, e.to_string())).await?;
                }
            }
        }

        Frame::Unsubscribe { destination } => {
            debug!(session = %session_id, destination = %destination, "Unsubscribe request");

            if let Some(handle) = subscription_tasks.remove(destination) {
                handle.abort();
            }
            state.broker.purge_idle();
            metrics::set_active_destinations(state.broker.destination_count());
        }

        Frame::SendPublic {
            sender, content, ..
        } => {
            match state.engine.send_public_message(sender, content).await {
                Some(_) => metrics::record_event("chat.send"),
                None => metrics::record_dropped("chat.send"),
            }
        }

        Frame::AddUser { sender } => {
            match state.engine.add_user(session_id, sender).await {
                Some(_) => metrics::record_event("chat.add_user"),
                None => metrics::record_dropped("chat.add_user"),
            }
        }

        Frame::SendPrivate {
            sender,
            recipient,
            content,
            ..
        } => {
            match state
                .engine
                .send_private_message(sender, recipient, content)
                .await
            {
                Some(_) => metrics::record_event("chat.private"),
                None => metrics::record_dropped("chat.private"),
            }
        }

        Frame::SendGroup {
            sender,
            group_id,
            content,
            ..
        } => {
            match state
                .engine
                .send_group_message(sender, *group_id, content)
                .await
            {
                Some(_) => metrics::record_event("group.send"),
                None => metrics::record_dropped("group.send"),
            }
        }

        Frame::JoinGroup { sender, group_id } => {
            match state.engine.join_group(sender, *group_id).await {
                Some(_) => metrics::record_event("group.join"),
                None => metrics::record_dropped("group.join"),
            }
        }

        Frame::LeaveGroup { sender, group_id } => {
            match state.engine.leave_group(sender, *group_id).await {
                Some(_) => metrics::record_event("group.leave"),
                None => metrics::record_dropped("group.leave"),
            }
        }

        Frame::Connected { .. } | Frame::Deliver { .. } | Frame::Error { .. } => {
            warn!(session = %session_id, frame = frame.kind(), "Unexpected server frame from client");
        }
    }

    Ok(())
}

/// Send a frame to the WebSocket.
async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    sink.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
