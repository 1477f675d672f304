fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn board_hash_hex(board: &Board) -> String {
    format!("{:016x}", board.state_hash())
}

fn stream_cursor(label: &str, timestamp: u64, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{label}:{timestamp}:{id}"),
        None => format!("{label}:{timestamp}"),
    }
}
