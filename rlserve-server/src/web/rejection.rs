// Turns warp rejections into `{"detail": ...}` JSON responses

use rlserve_core::{AuthFailure, ServeError};
use serde_json::json;
use std::convert::Infallible;
use tracing::error;
use warp::http::{header, StatusCode};
use warp::{Rejection, Reply};

/// Carries a [`ServeError`] through warp's rejection machinery
#[derive(Debug)]
pub struct ApiError(pub ServeError);

impl warp::reject::Reject for ApiError {}

pub fn reject(error: ServeError) -> Rejection {
    warp::reject::custom(ApiError(error))
}

/// Status code for a serving error
#[must_use]
pub fn status_for(error: &ServeError) -> StatusCode {
    match error {
        ServeError::Unauthorized(AuthFailure::ApiKey) => StatusCode::FORBIDDEN,
        ServeError::Unauthorized(AuthFailure::Basic) => StatusCode::UNAUTHORIZED,
        ServeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServeError::Upstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, detail: String) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(&json!({ "detail": detail })), status).into_response()
}

/// Map any rejection onto a status code and a detail message
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(ApiError(e)) = err.find::<ApiError>() {
        let status = status_for(e);
        if status.is_server_error() {
            error!(error = %e, status = status.as_u16(), "request failed");
        }
        let mut response = error_reply(status, e.to_string());
        if matches!(e, ServeError::Unauthorized(AuthFailure::Basic)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Basic"));
        }
        return Ok(response);
    }

    let (status, detail) = if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type".to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
    };

    Ok(error_reply(status, detail))
}
