use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_derive::Serialize;
use crate::error::SupernodeError;

pub const SUCCESS: i32 = 200;

pub const SYSTEM_ERROR: i32 = 500;
pub const PARAM_ERROR: i32 = 501;
pub const TARGET_NOT_FOUND: i32 = 502;

pub const PEER_FINISH: i32 = 600;
pub const PEER_CONTINUE: i32 = 601;
pub const PEER_WAIT: i32 = 602;
pub const SUPER_FAIL: i32 = 604;
pub const UNKNOWN_ERROR: i32 = 605;
pub const TASK_CONFLICT: i32 = 606;
pub const URL_NOT_REACHABLE: i32 = 607;
pub const NEED_AUTH: i32 = 608;
pub const GET_PIECE_REPORT: i32 = 611;
pub const GET_PEER_DOWN: i32 = 612;

pub fn message(code: i32) -> &'static str {
    match code {
        SUCCESS => "success",
        SYSTEM_ERROR => "system error",
        PARAM_ERROR => "param is illegal",
        TARGET_NOT_FOUND => "target not found",
        PEER_FINISH => "peer task end",
        PEER_CONTINUE => "peer task go on",
        PEER_WAIT => "peer task wait",
        SUPER_FAIL => "super node sync source fail",
        UNKNOWN_ERROR => "unknown error",
        TASK_CONFLICT => "task conflict",
        URL_NOT_REACHABLE => "url is not reachable",
        NEED_AUTH => "need auth",
        _ => "",
    }
}

// Wire code reported for an error kind.
pub fn error_code(err: &SupernodeError) -> i32 {
    match err {
        SupernodeError::EmptyValue(_) | SupernodeError::InvalidValue(_) => PARAM_ERROR,
        SupernodeError::DataNotFound(_) => TARGET_NOT_FOUND,
        SupernodeError::PeerWait(_) => PEER_WAIT,
        SupernodeError::PeerContinue(_) => PEER_CONTINUE,
        SupernodeError::UrlNotReachable(_) => URL_NOT_REACHABLE,
        SupernodeError::CdnFail(_) => SUPER_FAIL,
        SupernodeError::TaskIdDuplicate(_) => TASK_CONFLICT,
        SupernodeError::AuthenticationRequired(_) => NEED_AUTH,
        SupernodeError::UnknownError(_) => UNKNOWN_ERROR,
        _ => SYSTEM_ERROR,
    }
}

// Body of every api answer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResultInfo<T> {

    pub code: i32,

    pub msg: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

}

impl<T: serde::Serialize> ResultInfo<T> {

    pub fn with_data(code: i32, data: T) -> Self {
        Self { code, msg: message(code).to_string(), data: Some(data) }
    }

}

impl ResultInfo<()> {

    pub fn with_code(code: i32) -> Self {
        Self { code, msg: message(code).to_string(), data: None }
    }

    pub fn from_error(err: &SupernodeError) -> Self {
        Self { code: error_code(err), msg: err.to_string(), data: None }
    }

}

// Failure of a handler, answered with an http status matching its kind.
#[derive(Debug)]
pub struct ApiError(pub SupernodeError);

impl From<SupernodeError> for ApiError {
    fn from(e: SupernodeError) -> Self {
        ApiError(e)
    }
}

impl ApiError {

    fn status(&self) -> StatusCode {
        match &self.0 {
            SupernodeError::EmptyValue(_) | SupernodeError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            SupernodeError::DataNotFound(_) => StatusCode::NOT_FOUND,
            SupernodeError::TaskIdDuplicate(_) => StatusCode::CONFLICT,
            SupernodeError::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::debug!("request rejected: {}", self.0);
        }
        (status, Json(ResultInfo::<()>::from_error(&self.0))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn parse_json<T: serde::de::DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(SupernodeError::InvalidValue(format!("request body: {}", e))))
}
