use api_contract::{error_codes, ApiResponse};

#[test]
fn success_response_has_data() {
    let response = ApiResponse::success(vec!["a", "b"]);
    assert!(response.success);
    assert_eq!(response.data, Some(vec!["a", "b"]));
    assert!(response.error.is_none());
}

#[test]
fn error_response_has_code_and_message() {
    let response = ApiResponse::<()>::error(error_codes::GATEWAY_NOT_CONNECTED, "gateway offline");
    assert!(!response.success);
    assert!(response.data.is_none());
    let error = response.error.expect("error body");
    assert_eq!(error.code, "GATEWAY.NOT_CONNECTED");
    assert_eq!(error.message, "gateway offline");
}

#[test]
fn token_request_parses_form_fields() {
    let request: api_contract::TokenRequest = serde_json::from_str(
        r#"{"grant_type":"client_credentials","client_id":"gateway-x","client_secret":"s"}"#,
    )
    .expect("parse");
    assert_eq!(request.grant_type, "client_credentials");
    assert_eq!(request.client_id, "gateway-x");
}
