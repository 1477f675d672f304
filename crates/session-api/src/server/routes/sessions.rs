#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    difficulty: Difficulty,
    #[serde(default)]
    initial_elapsed_seconds: u64,
}

#[derive(Debug, Serialize)]
struct SessionListResponse {
    schema_version: String,
    sessions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinPlayerRequest {
    player_id: Option<String>,
    display_name: String,
}

#[derive(Debug, Serialize)]
struct JoinPlayerResponse {
    schema_version: String,
    session_id: String,
    player: Player,
    rejoin: bool,
    join_event: Option<GameEvent>,
}

#[derive(Debug, Serialize)]
struct BoardResponse {
    schema_version: String,
    session_id: String,
    board: Board,
    solved: bool,
    state_hash: String,
    completed_at: Option<u64>,
    event_count: usize,
}

#[derive(Debug, Serialize)]
struct TimelineResponse {
    schema_version: String,
    session_id: String,
    entries: Vec<TimelineEntry>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), HttpApiError> {
    let puzzle = state
        .puzzles
        .fetch_random(request.difficulty)
        .map_err(HttpApiError::from_puzzle_store)?;
    let view = state
        .log
        .create_session(NewSession::from_puzzle(
            request.difficulty,
            puzzle,
            request.initial_elapsed_seconds,
        ))
        .map_err(HttpApiError::from_transport)?;

    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, HttpApiError> {
    let sessions = state
        .log
        .list_sessions()
        .map_err(HttpApiError::from_transport)?;

    Ok(Json(SessionListResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        sessions,
    }))
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, HttpApiError> {
    require_session(&state, &session_id).map(Json)
}

async fn join_player(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<JoinPlayerRequest>,
) -> Result<Json<JoinPlayerResponse>, HttpApiError> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(HttpApiError::invalid_request(
            "displayName must not be blank",
            None,
        ));
    }

    let view = require_session(&state, &session_id)?;
    if !view.session.is_active {
        return Err(HttpApiError::session_not_found(&session_id));
    }

    let player_id = request
        .player_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(mint_player_id);
    let player = match view.player(&player_id) {
        Some(known) => Player {
            is_active: true,
            ..known.clone()
        },
        None => Player {
            id: player_id.clone(),
            name: display_name.to_string(),
            joined_at: state.log.clock().now_ms(),
            is_active: true,
        },
    };

    let join_event = announce_player(state.log.as_ref(), &view, player.clone())
        .map_err(HttpApiError::from_transport)?;

    Ok(Json(JoinPlayerResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        rejoin: join_event.is_none(),
        player,
        join_event,
    }))
}

async fn append_event(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<GameEvent>), HttpApiError> {
    let draft = serde_json::from_value::<EventDraft>(payload).map_err(|err| {
        warn!(%session_id, error = %err, "rejected event with invalid shape");
        HttpApiError::invalid_event_shape(err.to_string())
    })?;

    let event = state
        .log
        .append_event(&session_id, draft)
        .map_err(HttpApiError::from_transport)?;

    Ok((StatusCode::CREATED, Json(event)))
}

async fn append_chat(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(draft): Json<ChatDraft>,
) -> Result<(StatusCode, Json<ChatMessage>), HttpApiError> {
    let message = draft.message.trim().to_string();
    if message.is_empty() {
        return Err(HttpApiError::invalid_request("chat message must not be blank", None));
    }

    let message = state
        .log
        .append_chat(&session_id, ChatDraft { message, ..draft })
        .map_err(HttpApiError::from_transport)?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_board(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BoardResponse>, HttpApiError> {
    let view = require_session(&state, &session_id)?;
    let board = reconcile(&view.session.baseline, &view.events);

    Ok(Json(BoardResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        solved: board.is_solved(&view.session.solution),
        state_hash: board_hash_hex(&board),
        completed_at: view.session.completed_at,
        event_count: view.events.len(),
        board,
    }))
}

async fn get_timeline(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TimelineResponse>, HttpApiError> {
    let view = require_session(&state, &session_id)?;
    let entries = build_timeline(&view.chat, &view.events, state.config.timeline_cap);

    Ok(Json(TimelineResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        session_id,
        entries,
    }))
}
