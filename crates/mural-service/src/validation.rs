use chrono::{Months, NaiveDate};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("URL must have a host")]
    MissingHost,
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Invalid month, expected YYYY-MM: {0}")]
    InvalidYearMonth(String),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Password must have at least 8 characters")]
    WeakPassword,
    #[error("That URL belongs to an uploaded file, upload the image instead")]
    StoredAssetUrl,
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// Trims `value` and rejects it when nothing is left.
pub fn require_text(field: &'static str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Blank optional text collapses to `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validates an externally hosted URL (outbound links, external images).
pub fn validate_url(url_str: &str) -> Result<Url, ValidationError> {
    let url_str = url_str.trim();
    if url_str.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let url =
        Url::parse(url_str).map_err(|_| ValidationError::MalformedUrl(url_str.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(ValidationError::UnsupportedScheme(scheme.to_string())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ValidationError::MissingHost),
    }
}

pub fn normalize_url(url_str: &str) -> Result<String, ValidationError> {
    Ok(validate_url(url_str)?.to_string())
}

/// Like [`normalize_url`] but blank input means "no URL".
pub fn normalize_optional_url(url: Option<String>) -> Result<Option<String>, ValidationError> {
    optional_text(url).map(|u| normalize_url(&u)).transpose()
}

/// Resolves a `YYYY-MM` month to the last calendar day of that month.
pub fn last_day_of_month(year_month: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidYearMonth(year_month.to_string());

    let (year, month) = year_month.trim().split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next_month = first.checked_add_months(Months::new(1)).ok_or_else(invalid)?;
    next_month.pred_opt().ok_or_else(invalid)
}

/// Lower-cased extension of `filename`, if it has one.
pub fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ValidationError::InvalidEmail(email)),
    }
}

pub fn validate_password(password: String) -> Result<String, ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::WeakPassword);
    }
    Ok(password)
}
