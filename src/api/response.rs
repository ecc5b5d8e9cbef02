//! 统一响应包装
//!
//! 成功：`{ code: 0, message: "success", data }`
//! 失败：`{ code: "error_code", kind, message }`（见 [`ErrorBody`]）

use serde::Serialize;

use crate::error::{EngineError, ErrorBody};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data,
        }
    }
}

/// 错误响应与建议的 HTTP 状态码
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    #[serde(flatten)]
    pub body: ErrorBody,
}

impl From<&EngineError> for ApiError {
    fn from(err: &EngineError) -> Self {
        let status = match err {
            e if e.is_not_found() => 404,
            EngineError::SessionExpired => 401,
            e if e.is_client_error() => 400,
            EngineError::NetworkUnavailable(_)
            | EngineError::Rpc { .. }
            | EngineError::BroadcastOutcomeUnknown { .. } => 503,
            EngineError::BroadcastRejected { .. } => 422,
            _ => 500,
        };
        Self {
            status,
            body: ErrorBody::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let json = serde_json::to_value(ApiResponse::success(vec!["a"])).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"][0], "a");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::from(&EngineError::SessionNotFound).status, 404);
        assert_eq!(ApiError::from(&EngineError::SessionExpired).status, 401);
        assert_eq!(
            ApiError::from(&EngineError::InvalidAmount("-1".into())).status,
            400
        );
        assert_eq!(ApiError::from(&EngineError::AuthenticationFailed).status, 500);

        let err = ApiError::from(&EngineError::BroadcastOutcomeUnknown {
            network: "ethereum".into(),
            tx_hash: "0xabc".into(),
            nonce: "1".into(),
            message: "reset".into(),
        });
        assert_eq!(err.status, 503);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "broadcast_outcome_unknown");
        assert!(json.get("status").is_none());
    }
}
