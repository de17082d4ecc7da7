//! Extractors whose rejections render as [`AppError`] bodies.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// JSON request body. Malformed or mistyped bodies become a 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Path parameters. Unparseable segments become a 400.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
