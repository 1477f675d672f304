async fn stream_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, HttpApiError> {
    let view = require_session(&state, &session_id)?;
    let initial_message = StreamMessage::session_status(&view);

    // Both feeds replay history before going live.
    let events = state
        .log
        .subscribe_events(&session_id)
        .map_err(HttpApiError::from_transport)?;
    let chat = state
        .log
        .subscribe_chat(&session_id)
        .map_err(HttpApiError::from_transport)?;

    Ok(ws.on_upgrade(move |socket| {
        stream_socket(socket, session_id, initial_message, events, chat)
    }))
}

async fn stream_socket(
    mut socket: WebSocket,
    session_id: String,
    initial_message: StreamMessage,
    mut events: crate::log::Subscription<GameEvent>,
    mut chat: crate::log::Subscription<ChatMessage>,
) {
    if send_stream_message(&mut socket, &initial_message)
        .await
        .is_err()
    {
        return;
    }
    debug!(%session_id, "stream client attached");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
            outgoing = events.next() => {
                let Some(event) = outgoing else {
                    let warning = StreamMessage::warning(&session_id, "event feed closed");
                    let _ = send_stream_message(&mut socket, &warning).await;
                    break;
                };
                if send_stream_message(&mut socket, &StreamMessage::event_appended(&session_id, &event))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            outgoing = chat.next() => {
                let Some(message) = outgoing else {
                    let warning = StreamMessage::warning(&session_id, "chat feed closed");
                    let _ = send_stream_message(&mut socket, &warning).await;
                    break;
                };
                if send_stream_message(&mut socket, &StreamMessage::chat_appended(&session_id, &message))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    debug!(%session_id, "stream client detached");
}

async fn send_stream_message(
    socket: &mut WebSocket,
    message: &StreamMessage,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

#[derive(Debug, Clone, Serialize)]
struct StreamMessage {
    schema_version: String,
    #[serde(rename = "type")]
    message_type: String,
    session_id: String,
    timestamp: u64,
    cursor: String,
    payload: Value,
}

impl StreamMessage {
    fn session_status(view: &SessionView) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "session.status".to_string(),
            session_id: view.session_id.clone(),
            timestamp: view.session.last_activity,
            cursor: stream_cursor("status", view.session.last_activity, None),
            payload: json!({
                "session": view.session,
                "players": view.players,
            }),
        }
    }

    fn event_appended(session_id: &str, event: &GameEvent) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "event.appended".to_string(),
            session_id: session_id.to_string(),
            timestamp: event.timestamp,
            cursor: stream_cursor("event", event.timestamp, Some(&event.id)),
            payload: json!(event),
        }
    }

    fn chat_appended(session_id: &str, message: &ChatMessage) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "chat.appended".to_string(),
            session_id: session_id.to_string(),
            timestamp: message.timestamp,
            cursor: stream_cursor("chat", message.timestamp, Some(&message.id)),
            payload: json!(message),
        }
    }

    fn warning(session_id: &str, warning: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "warning".to_string(),
            session_id: session_id.to_string(),
            timestamp: 0,
            cursor: stream_cursor("warning", 0, None),
            payload: json!({ "message": warning }),
        }
    }
}
