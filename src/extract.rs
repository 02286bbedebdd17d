use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json<T>` whose rejections answer with the usual `{ "message": ... }` body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
