use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

use crate::repo::RepoError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("sign in required")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("not found")] NotFound,
    #[error("bad request: {0}")] BadRequest(String),
    #[error("conflict")] Conflict,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Invalid(msg) => ApiError::BadRequest(msg),
            RepoError::ViewerRequired => ApiError::Unauthorized,
            RepoError::Internal(msg) => {
                log::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn viewer_required_maps_to_401() {
        let e: ApiError = RepoError::ViewerRequired.into();
        assert_eq!(e.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn not_found_is_distinct_from_internal() {
        let nf: ApiError = RepoError::NotFound.into();
        let int: ApiError = RepoError::Internal("db down".into()).into();
        assert_eq!(nf.error_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(int.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_becomes_bad_request_with_message() {
        let e: ApiError = RepoError::Invalid("parent comment does not exist".into()).into();
        assert_eq!(e.error_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "bad request: parent comment does not exist");
    }
}
