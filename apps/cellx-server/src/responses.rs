use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cellx_core::dataset::DatasetError;
use cellx_core::{EngineError, FilterError};
use cellx_protocol::ProblemDetails;
use cellx_store::StoreError;

/// Logged alongside every response that fails because a computed result
/// cannot be represented.
pub(crate) const NON_FINITE_WARNING: &str =
    "encountered NaN or Infinity in a computed result; the data may need cleaning before it can be served";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Obsolete(String),
    #[error("response type not acceptable")]
    NotAcceptable,
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0} is disabled on this server")]
    FeatureDisabled(&'static str),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    Encoding(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        ApiError::BadRequest(detail.into())
    }

    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub(crate) fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::Obsolete(_) => StatusCode::NOT_FOUND,
            ApiError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::FeatureDisabled(_) | ApiError::NotImplemented(_) => {
                StatusCode::NOT_IMPLEMENTED
            }
            ApiError::Encoding(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "Bad Request",
            ApiError::NotFound(_) => "Not Found",
            ApiError::Obsolete(_) => "Obsolete Request",
            ApiError::NotAcceptable => "Not Acceptable",
            ApiError::UnsupportedMediaType(_) => "Unsupported Media Type",
            ApiError::FeatureDisabled(_) => "Feature Disabled",
            ApiError::NotImplemented(_) => "Not Implemented",
            ApiError::Encoding(_) => "Encoding Error",
            ApiError::Internal(_) => "Internal Server Error",
        }
    }
}

pub(crate) fn problem_response(status: StatusCode, title: &str, detail: Option<&str>) -> Response {
    let body = ProblemDetails {
        r#type: "about:blank".into(),
        title: title.to_string(),
        status: status.as_u16(),
        detail: detail.map(str::to_string),
    };
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();
        match &self {
            ApiError::Encoding(_) => {
                tracing::warn!("{NON_FINITE_WARNING}");
                tracing::error!(status = status.as_u16(), error = %detail, "request failed");
            }
            ApiError::Internal(_) => {
                tracing::error!(status = status.as_u16(), error = %detail, "request failed");
            }
            _ => {
                tracing::debug!(status = status.as_u16(), error = %detail, "request rejected");
            }
        }
        problem_response(status, self.title(), Some(&detail))
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidName(_)
            | StoreError::UnsafeCollection(_)
            | StoreError::InvalidLabels(_)
            | StoreError::InvalidGeneSets(_)
            | StoreError::AlreadyExists(_) => ApiError::BadRequest(err.to_string()),
            StoreError::MissingArtifact { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Obsolete { .. } => ApiError::Obsolete(err.to_string()),
            StoreError::Io(_)
            | StoreError::Codec(_)
            | StoreError::Serde(_)
            | StoreError::Csv(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unsupported(msg) => ApiError::NotImplemented(msg),
            EngineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            EngineError::Failed(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<DatasetError> for ApiError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::UnknownLayer(_) | DatasetError::VarOutOfBounds { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<cellx_codec::CodecError> for ApiError {
    fn from(err: cellx_codec::CodecError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
