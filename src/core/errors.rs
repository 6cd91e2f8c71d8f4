use http::StatusCode;
use spin_sdk::http::Response;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("Internal Error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the caller. Internal details stay in the log.
    pub fn message(&self) -> Option<String> {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Upstream(msg)
            | ApiError::Unavailable(msg) => Some(msg.clone()),
            ApiError::Unauthorized | ApiError::Forbidden | ApiError::Internal(_) => None,
        }
    }
}

/// `{"error": <reason phrase>, "message": <text>}`, message omitted when there is none.
pub fn error_body(status: StatusCode, message: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "error": status.canonical_reason().unwrap_or("Unknown error"),
    });
    if let Some(msg) = message {
        body["message"] = serde_json::Value::String(msg.to_string());
    }
    body
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        if let ApiError::Internal(inner) = &err {
            log::error!("internal error: {:#}", inner);
        }
        let status = err.status();
        let body = error_body(status, err.message().as_deref());
        Response::builder()
            .status(status.as_u16())
            .header("Content-Type", "application/json")
            .body(body.to_string().into_bytes())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_carries_message() {
        let resp: Response = ApiError::BadRequest("please use a different username".into()).into();
        assert_eq!(*resp.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["message"], "please use a different username");
    }

    #[test]
    fn internal_error_hides_details() {
        let resp: Response = ApiError::from(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(*resp.status(), 500);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert!(body.get("message").is_none());
    }

    #[test]
    fn forbidden_maps_to_403() {
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }
}
