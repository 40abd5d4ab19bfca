//! Request extractors

use crate::error::AppError;
use axum::{extract::FromRequest, Json};

/// JSON body whose rejections (missing body, bad syntax, wrong field types)
/// come back as a 422 `ApiError` instead of axum's plain-text response
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
