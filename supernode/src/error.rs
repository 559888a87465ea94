// Kinds of failure surfaced by the supernode core.
// Every kind carries a stable code which the api layer maps onto
// its wire result codes.
#[derive(thiserror::Error, Debug)]
pub enum SupernodeError {

    #[error("data not found: {0}")]
    DataNotFound(String),

    #[error("empty value: {0}")]
    EmptyValue(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("not initialized: {0}")]
    NotInitialized(String),

    #[error("convert failed: {0}")]
    ConvertFailed(String),

    #[error("range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("system error: {0}")]
    SystemError(String),

    #[error("cdn failed: {0}")]
    CdnFail(String),

    #[error("cdn wait: {0}")]
    CdnWait(String),

    #[error("peer wait: {0}")]
    PeerWait(String),

    #[error("peer continue: {0}")]
    PeerContinue(String),

    #[error("unknown error: {0}")]
    UnknownError(String),

    #[error("url not reachable: {0}")]
    UrlNotReachable(String),

    #[error("task id duplicate: {0}")]
    TaskIdDuplicate(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

}

impl SupernodeError {

    // Stable numeric code of the error kind.
    pub fn code(&self) -> i32 {
        match self {
            SupernodeError::DataNotFound(_) => 0,
            SupernodeError::EmptyValue(_) => 1,
            SupernodeError::InvalidValue(_) => 2,
            SupernodeError::NotInitialized(_) => 3,
            SupernodeError::ConvertFailed(_) | SupernodeError::JsonError(_) => 4,
            SupernodeError::RangeNotSatisfiable(_) => 5,
            SupernodeError::SystemError(_) | SupernodeError::IoError(_) => 6,
            SupernodeError::CdnFail(_) => 7,
            SupernodeError::CdnWait(_) => 8,
            SupernodeError::PeerWait(_) => 9,
            SupernodeError::UnknownError(_) | SupernodeError::HttpError(_) => 10,
            SupernodeError::PeerContinue(_) => 11,
            SupernodeError::UrlNotReachable(_) => 12,
            SupernodeError::TaskIdDuplicate(_) => 13,
            SupernodeError::AuthenticationRequired(_) => 14,
        }
    }

    pub fn is_data_not_found(&self) -> bool {
        matches!(self, SupernodeError::DataNotFound(_))
    }

}

impl From<tokio::task::JoinError> for SupernodeError {
    fn from(e: tokio::task::JoinError) -> Self {
        SupernodeError::SystemError(format!("task join error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, SupernodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(SupernodeError::DataNotFound("x".into()).code(), 0);
        assert_eq!(SupernodeError::RangeNotSatisfiable("x".into()).code(), 5);
        assert_eq!(SupernodeError::AuthenticationRequired("x".into()).code(), 14);
        let io = SupernodeError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.code(), SupernodeError::SystemError(String::new()).code());
    }
}
