use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{
    ValidationError, normalize_optional_url, require_text, validate_email, validate_password,
};

/// Identifier assigned by the backend on insert. Never reused.
pub type RecordId = i64;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Publication state of a news item. Only these two values are ever persisted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum NewsStatus {
    #[default]
    Draft,
    Published,
}

impl NewsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsStatus::Draft => "draft",
            NewsStatus::Published => "published",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, NewsStatus::Published)
    }
}

impl fmt::Display for NewsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(NewsStatus::Draft),
            "published" => Ok(NewsStatus::Published),
            other => Err(ParseEnumError {
                kind: "news status",
                value: other.to_string(),
            }),
        }
    }
}

impl ToSql<Text, Sqlite> for NewsStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for NewsStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

/// Dashboard role. Editors write content; admins also delete and manage staff.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Admin,
    #[default]
    Editor,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Editor => "editor",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(StaffRole::Admin),
            "editor" => Ok(StaffRole::Editor),
            other => Err(ParseEnumError {
                kind: "staff role",
                value: other.to_string(),
            }),
        }
    }
}

impl ToSql<Text, Sqlite> for StaffRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for StaffRole {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::news)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewsItem {
    pub id: RecordId,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub external_link: Option<String>,
    pub status: NewsStatus,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = crate::schema::news)]
pub struct NewNewsItem {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub external_link: Option<String>,
    pub status: NewsStatus,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: NaiveDateTime,
}

impl NewNewsItem {
    pub fn new(
        title: String,
        content: String,
        external_link: Option<String>,
        status: NewsStatus,
        now: NaiveDateTime,
    ) -> Result<Self, ValidationError> {
        Ok(NewNewsItem {
            title: require_text("title", title)?,
            content,
            image_url: None,
            external_link: normalize_optional_url(external_link)?,
            status,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a news row.
///
/// `None` leaves a column untouched; `Some(None)` clears a nullable column.
/// `updated_at` is always written, `created_at` never is.
#[derive(Debug, Clone, PartialEq, AsChangeset, Serialize)]
#[diesel(table_name = crate::schema::news)]
pub struct NewsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_link: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NewsStatus>,
    #[serde(with = "timestamp")]
    pub updated_at: NaiveDateTime,
}

impl NewsPatch {
    pub fn touch(now: NaiveDateTime) -> Self {
        NewsPatch {
            title: None,
            content: None,
            image_url: None,
            external_link: None,
            status: None,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: NewsStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Document {
    pub id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub file_url: String,
    pub file_type: String,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = crate::schema::documents)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub file_url: String,
    pub file_type: String,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::relatorios_sociais)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SocialReport {
    pub id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub file_url: String,
    pub file_type: String,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = crate::schema::relatorios_sociais)]
pub struct NewSocialReport {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub file_url: String,
    pub file_type: String,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
}

/// Staff account id. Numeric in the local backend, a UUID in the hosted one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffId(pub String);

impl From<i64> for StaffId {
    fn from(id: i64) -> Self {
        StaffId(id.to_string())
    }
}

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::staff)]
pub struct StaffMember {
    #[diesel(deserialize_as = i64)]
    pub id: StaffId,
    pub email: String,
    pub role: StaffRole,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaffMember {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: StaffRole,
}

impl NewStaffMember {
    pub fn new(email: String, password: String, role: StaffRole) -> Result<Self, ValidationError> {
        Ok(NewStaffMember {
            email: validate_email(&email)?,
            password: validate_password(password)?,
            role,
        })
    }
}

/// An authenticated dashboard actor, passed explicitly to every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub role: StaffRole,
    pub access_token: String,
    #[serde(with = "timestamp")]
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, StaffRole::Admin)
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}

/// RFC 3339 timestamps in UTC.
///
/// Accepts offset timestamps (`2024-01-01T10:00:00+00:00`), `Z` suffixes and
/// naive forms with either `T` or a space separator.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn format(value: &NaiveDateTime) -> String {
        value.and_utc().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Some(with_offset.naive_utc());
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_status_round_trips_through_str() {
        assert_eq!("draft".parse::<NewsStatus>().unwrap(), NewsStatus::Draft);
        assert_eq!(
            "published".parse::<NewsStatus>().unwrap(),
            NewsStatus::Published
        );
        assert!("archived".parse::<NewsStatus>().is_err());
    }

    #[test]
    fn test_status_defaults_to_draft() {
        assert_eq!(NewsStatus::default(), NewsStatus::Draft);
        assert!(!NewsStatus::Draft.is_public());
        assert!(NewsStatus::Published.is_public());
    }

    #[test]
    fn test_new_news_item_requires_title() {
        let result = NewNewsItem::new(
            "   ".to_string(),
            "corpo".to_string(),
            None,
            NewsStatus::Draft,
            at(9),
        );
        assert!(matches!(result, Err(ValidationError::MissingField("title"))));
    }

    #[test]
    fn test_new_news_item_trims_title_and_sets_timestamps() {
        let item = NewNewsItem::new(
            "  Bazar de Natal ".to_string(),
            "...".to_string(),
            Some("https://example.org/bazar".to_string()),
            NewsStatus::Draft,
            at(9),
        )
        .unwrap();

        assert_eq!(item.title, "Bazar de Natal");
        assert_eq!(item.created_at, item.updated_at);
        assert_eq!(item.external_link.as_deref(), Some("https://example.org/bazar"));
        assert!(item.image_url.is_none());
    }

    #[test]
    fn test_patch_serializes_only_touched_columns() {
        let mut patch = NewsPatch::touch(at(10)).with_status(NewsStatus::Published);
        patch.image_url = Some(None);

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["status"], "published");
        assert!(json["image_url"].is_null());
        assert!(json.get("image_url").is_some());
        assert!(json.get("title").is_none());
        assert_eq!(json["updated_at"], "2024-12-01T10:00:00.000000Z");
    }

    #[test]
    fn test_timestamp_accepts_hosted_and_naive_forms() {
        let expected = at(10);
        assert_eq!(timestamp::parse("2024-12-01T10:00:00+00:00"), Some(expected));
        assert_eq!(timestamp::parse("2024-12-01T07:00:00-03:00"), Some(expected));
        assert_eq!(timestamp::parse("2024-12-01T10:00:00Z"), Some(expected));
        assert_eq!(timestamp::parse("2024-12-01T10:00:00"), Some(expected));
        assert_eq!(timestamp::parse("2024-12-01 10:00:00"), Some(expected));
        assert_eq!(timestamp::parse("yesterday"), None);
    }

    #[test]
    fn test_news_item_deserializes_hosted_row() {
        let row = serde_json::json!({
            "id": 7,
            "title": "Bazar de Natal",
            "content": "...",
            "image_url": null,
            "external_link": null,
            "status": "published",
            "created_at": "2024-12-01T10:00:00.123456+00:00",
            "updated_at": "2024-12-01T10:00:00+00:00"
        });

        let item: NewsItem = serde_json::from_value(row).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.status, NewsStatus::Published);
    }

    #[test]
    fn test_session_expiry_and_role() {
        let session = Session {
            user_id: "1".to_string(),
            email: "ana@example.org".to_string(),
            role: StaffRole::Editor,
            access_token: "token".to_string(),
            expires_at: at(12),
        };

        assert!(!session.is_admin());
        assert!(!session.is_expired(at(11)));
        assert!(session.is_expired(at(12)));
    }
}
