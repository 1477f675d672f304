#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn session_not_found(session_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::SessionNotFound,
                "session_id does not match a known session",
                Some(format!("session_id={session_id}")),
            ),
        }
    }

    fn invalid_event_shape(details: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(
                ErrorCode::InvalidEventShape,
                "event payload does not match the event record shape",
                Some(details),
            ),
        }
    }

    fn invalid_request(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidRequest, message, details),
        }
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, details),
        }
    }

    fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::UnknownSession(session_id) => Self::session_not_found(&session_id),
            other => Self::internal("event log operation failed", Some(other.to_string())),
        }
    }

    fn from_puzzle_store(err: PuzzleStoreError) -> Self {
        match err {
            PuzzleStoreError::NoPuzzleAvailable(difficulty) => Self::invalid_request(
                "no puzzle available for the requested difficulty",
                Some(format!("difficulty={difficulty}")),
            ),
            other => Self::internal("puzzle store operation failed", Some(other.to_string())),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
