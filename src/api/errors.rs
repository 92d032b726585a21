// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vision::ImageError;

pub const MODEL_NOT_LOADED_DETAIL: &str = "The model is not loaded. Check the server logs.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    InvalidRequest(String),
    PayloadTooLarge { max: usize },
    ValidationError { field: String, message: String },
    InvalidImage(String),
    ModelNotLoaded,
    InternalError(String),
}

impl ApiError {
    /// Client-facing message
    pub fn detail(&self) -> String {
        match self {
            ApiError::InvalidRequest(msg) => msg.clone(),
            ApiError::PayloadTooLarge { max } => {
                format!("Upload exceeds the {} byte limit", max)
            }
            ApiError::ValidationError { message, .. } => message.clone(),
            ApiError::InvalidImage(reason) => {
                format!("Could not process the image file: {}", reason)
            }
            ApiError::ModelNotLoaded => MODEL_NOT_LOADED_DETAIL.to_string(),
            ApiError::InternalError(msg) => msg.clone(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::ValidationError { .. } => "validation_error",
            ApiError::InvalidImage(_) => "invalid_image",
            ApiError::ModelNotLoaded => "model_not_loaded",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let field = match self {
            ApiError::ValidationError { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorResponse {
            detail: self.detail(),
            error_type: self.error_type().to_string(),
            field,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) | ApiError::InvalidImage(_) => 400,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::ValidationError { .. } => 422,
            ApiError::ModelNotLoaded | ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::PayloadTooLarge { max } => write!(f, "Payload too large (max: {})", max),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::InvalidImage(reason) => write!(f, "Invalid image: {}", reason),
            ApiError::ModelNotLoaded => write!(f, "Model not loaded"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::TooLarge(_, max) => ApiError::PayloadTooLarge { max },
            other => ApiError::InvalidImage(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}
