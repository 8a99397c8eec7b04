use std::convert::Infallible;

use serde::Serialize;
use tracing::error;
use warp::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::Rejection;
use warp::Reply;

use crate::ClusterError;
use crate::Error;
use crate::StoreError;

/// Failure carried through warp's rejection chain to [`handle_rejection`]
#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl Reject for ApiError {}

impl ApiError {
    pub(super) fn not_found(detail: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.to_string(),
        }
    }

    pub(super) fn unavailable(detail: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: detail.to_string(),
        }
    }

    /// Store outages are 503 and an exhausted cluster 409, both with the
    /// error text. Anything else is a 500 carrying `fallback`.
    pub(super) fn from_error(
        e: &Error,
        fallback: &str,
    ) -> Self {
        let status = match e {
            Error::Store(StoreError::Unavailable { .. }) | Error::Store(StoreError::Connection { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Cluster(ClusterError::NoHealthyMembers) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            fallback.to_string()
        } else {
            e.to_string()
        };
        Self { status, detail }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub(super) async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, detail) = if let Some(api) = err.find::<ApiError>() {
        (api.status, api.detail.clone())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string())
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(warp::reply::json(&ErrorBody { detail }), status))
}
