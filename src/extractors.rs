use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json<T>` whose rejection is an `AppError` envelope rather than plain text.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(rejection_to_app_error(rejection)),
        }
    }
}

fn rejection_to_app_error(rejection: JsonRejection) -> AppError {
    tracing::warn!(error = %rejection, "Request body rejected");
    match rejection {
        // Field-level errors name the offending field and are safe to return.
        JsonRejection::JsonDataError(e) => {
            AppError::bad_request("INVALID_REQUEST_BODY", &e.body_text())
        }
        JsonRejection::MissingJsonContentType(_) => AppError::bad_request(
            "INVALID_REQUEST_BODY",
            "Expected Content-Type: application/json",
        ),
        _ => AppError::bad_request("INVALID_REQUEST_BODY", "Malformed JSON body"),
    }
}
