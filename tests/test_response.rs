use nvrd::http::response::{Response, ResponseBuilder, StatusCode};

#[test]
fn test_builder_adds_content_length() {
    let res = ResponseBuilder::new(StatusCode::Ok)
        .body(b"hello".to_vec())
        .build();
    assert_eq!(res.header("Content-Length"), Some("5"));
}

#[test]
fn test_builder_keeps_explicit_content_length() {
    let res = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "99")
        .body(b"hello".to_vec())
        .build();
    assert_eq!(res.header("Content-Length"), Some("99"));
}

#[test]
fn test_set_body_refreshes_content_length() {
    let mut res = Response::ok("short");
    res.set_body(b"a longer body".to_vec());
    assert_eq!(res.header("Content-Length"), Some("13"));
}

#[test]
fn test_json_error_shape() {
    let res = Response::json_error(StatusCode::NotFound, "Not Found");
    assert_eq!(res.status, StatusCode::NotFound);
    assert_eq!(res.header("Content-Type"), Some("application/json"));
    let value: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(value["error"], "Not Found");
}

#[test]
fn test_status_code_round_trip() {
    for status in [
        StatusCode::Ok,
        StatusCode::PartialContent,
        StatusCode::BadRequest,
        StatusCode::NotFound,
        StatusCode::RangeNotSatisfiable,
        StatusCode::InternalServerError,
        StatusCode::BadGateway,
        StatusCode::ServiceUnavailable,
    ] {
        assert_eq!(StatusCode::from_u16(status.as_u16()), Some(status));
    }
    assert_eq!(StatusCode::from_u16(418), None);
}

#[test]
fn test_reason_phrases() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::RangeNotSatisfiable.reason_phrase(), "Range Not Satisfiable");
}

#[test]
fn test_header_lookup_is_case_insensitive() {
    let res = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "video/mp4")
        .build();
    assert_eq!(res.header("content-type"), Some("video/mp4"));
}
