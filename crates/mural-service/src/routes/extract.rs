//! Request extractors shared by the API handlers.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::{FromRequestParts, Multipart};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use crate::AppState;
use crate::errors::ApiError;
use crate::models::Session;
use crate::upload::FileUpload;
use crate::validation::ValidationError;

/// Largest multipart body accepted. Leaves room for form fields on top of
/// the biggest bucket limit.
pub const MAX_FORM_BYTES: usize = 12 * 1024 * 1024;

/// The signed-in staff member behind a `Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

impl<S: AppState> FromRequestParts<S> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::Unauthorized)?;

        match state.auth().session(&token).await? {
            Some(session) => Ok(AuthSession(session)),
            None => {
                debug!("Unknown or expired access token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// A multipart form read into memory, text fields and files by name.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, FileUpload>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                // a file input left empty still sends a part with a blank name
                Some(filename) if filename.is_empty() => {}
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(bad_form)?;
                    debug!(field = %name, filename = %filename, size = bytes.len(), "Received file");
                    form.files
                        .insert(name, FileUpload::new(filename, content_type, bytes));
                }
                None => {
                    let value = field.text().await.map_err(bad_form)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Takes a text field. Blank values count as absent.
    pub fn text(&mut self, name: &str) -> Option<String> {
        self.fields
            .remove(name)
            .filter(|value| !value.trim().is_empty())
    }

    /// Takes a text field, keeping it even when blank.
    pub fn raw(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn required(&mut self, name: &'static str) -> Result<String, ApiError> {
        self.text(name)
            .ok_or(ApiError::ValidationError(ValidationError::MissingField(name)))
    }

    pub fn parsed<T>(&mut self, name: &str) -> Result<Option<T>, ApiError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|err: T::Err| ApiError::BadRequest(err.to_string()))
            })
            .transpose()
    }

    /// Checkbox-style flag: present and not `false`/`0`.
    pub fn flag(&mut self, name: &str) -> bool {
        self.text(name)
            .is_some_and(|value| !matches!(value.trim(), "false" | "0" | "off"))
    }

    pub fn file(&mut self, name: &str) -> Option<FileUpload> {
        self.files.remove(name)
    }

    pub fn required_file(&mut self, name: &'static str) -> Result<FileUpload, ApiError> {
        self.file(name)
            .ok_or(ApiError::ValidationError(ValidationError::MissingField(name)))
    }
}

fn bad_form(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid form data: {}", err.body_text()))
}
