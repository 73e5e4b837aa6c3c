use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{HostedClient, read_json, send};
use crate::backend::{DocumentStore, NewsStore, ReportStore};
use crate::errors::BackendError;
use crate::models::{
    Document, NewDocument, NewNewsItem, NewSocialReport, NewsItem, NewsPatch, NewsStatus,
    RecordId, Session, SocialReport, timestamp,
};
use crate::retrieval::{DocumentQuery, NewsQuery, RowRange};

const NEWS_TABLE: &str = "news";
const DOCUMENTS_TABLE: &str = "documents";
const REPORTS_TABLE: &str = "relatorios_sociais";

/// PostgREST query string, in insertion order. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Params(Vec<(&'static str, String)>);

impl Params {
    fn eq(mut self, column: &'static str, value: impl std::fmt::Display) -> Self {
        self.0.push((column, format!("eq.{value}")));
        self
    }

    fn gte(mut self, column: &'static str, value: impl std::fmt::Display) -> Self {
        self.0.push((column, format!("gte.{value}")));
        self
    }

    /// Case-insensitive substring match on any of `columns`.
    fn search(mut self, columns: &[&str], needle: &str) -> Self {
        let pattern = quote(&format!("*{}*", escape_like(needle)));
        let alternatives: Vec<String> = columns
            .iter()
            .map(|column| format!("{column}.ilike.{pattern}"))
            .collect();
        self.0.push(("or", format!("({})", alternatives.join(","))));
        self
    }

    fn order(mut self, ordering: impl Into<String>) -> Self {
        self.0.push(("order", ordering.into()));
        self
    }

    fn select(mut self, columns: &str) -> Self {
        self.0.push(("select", columns.to_string()));
        self
    }

    fn pairs(&self) -> &[(&'static str, String)] {
        &self.0
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Double-quotes a value so `,` `(` `)` inside it do not break an `or` list.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '\\' | '"') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Total from a `Content-Range` header such as `0-8/42` or `*/0`.
pub(crate) fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.parse().ok()
}

pub(crate) fn news_params(viewer: Option<&Session>, query: &NewsQuery) -> Params {
    let mut params = Params::default();
    match (viewer, query.status) {
        (None, Some(NewsStatus::Published) | None) => {
            params = params.eq("status", NewsStatus::Published);
        }
        // anonymous viewers asking for drafts get nothing
        (None, Some(status)) => {
            params = params
                .eq("status", NewsStatus::Published)
                .eq("status", status);
        }
        (Some(_), Some(status)) => params = params.eq("status", status),
        (Some(_), None) => {}
    }
    if let Some(after) = &query.created_after {
        params = params.gte("created_at", timestamp::format(after));
    }
    if let Some(needle) = &query.search {
        params = params.search(&["title", "content"], needle);
    }
    params
}

pub(crate) fn document_params(query: &DocumentQuery) -> Params {
    let mut params = Params::default();
    if let Some(category) = &query.category {
        params = params.eq("category", category);
    }
    if let Some(needle) = &query.search {
        params = params.search(&["title", "description"], needle);
    }
    params
}

/// One table behind `/rest/v1`.
struct Table<'a> {
    client: &'a HostedClient,
    name: &'static str,
}

impl<'a> Table<'a> {
    fn new(client: &'a HostedClient, name: &'static str) -> Self {
        Table { client, name }
    }

    fn path(&self) -> String {
        format!("rest/v1/{}", self.name)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        session: Option<&Session>,
        params: &Params,
        range: Option<RowRange>,
    ) -> Result<Vec<T>, BackendError> {
        let mut request = self
            .client
            .request(Method::GET, &self.path(), session)
            .query(params.pairs());
        if let Some(range) = range {
            request = request
                .header("Range-Unit", "items")
                .header("Range", format!("{}-{}", range.start, range.end));
        }
        read_json(send(request).await?).await
    }

    async fn count(&self, session: Option<&Session>, params: &Params) -> Result<u64, BackendError> {
        let request = self
            .client
            .request(Method::HEAD, &self.path(), session)
            .query(params.pairs())
            .header("Prefer", "count=exact");
        let response = send(request).await?;

        let header = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        parse_content_range(header).ok_or_else(|| {
            BackendError::Decode(format!("{}: unusable Content-Range {header:?}", self.name))
        })
    }

    async fn find<T: DeserializeOwned>(
        &self,
        session: Option<&Session>,
        params: Params,
        id: RecordId,
    ) -> Result<Option<T>, BackendError> {
        let rows: Vec<T> = self.select(session, &params.eq("id", id), None).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        session: &Session,
        body: &B,
    ) -> Result<T, BackendError> {
        let request = self
            .client
            .request(Method::POST, &self.path(), Some(session))
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<T> = read_json(send(request).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("{}: insert returned no row", self.name)))
    }

    async fn update<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        session: &Session,
        id: RecordId,
        body: &B,
    ) -> Result<Option<T>, BackendError> {
        let request = self
            .client
            .request(Method::PATCH, &self.path(), Some(session))
            .query(Params::default().eq("id", id).pairs())
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<T> = read_json(send(request).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        let request = self
            .client
            .request(Method::DELETE, &self.path(), Some(session))
            .query(Params::default().eq("id", id).pairs())
            .header("Prefer", "return=representation");
        let rows: Vec<Value> = read_json(send(request).await?).await?;
        debug!(table = self.name, id, deleted = rows.len(), "Deleted rows");
        Ok(!rows.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct PostgrestNewsStore {
    client: HostedClient,
}

impl PostgrestNewsStore {
    pub fn new(client: HostedClient) -> Self {
        PostgrestNewsStore { client }
    }

    fn table(&self) -> Table<'_> {
        Table::new(&self.client, NEWS_TABLE)
    }
}

#[async_trait]
impl NewsStore for PostgrestNewsStore {
    async fn list(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
        range: RowRange,
    ) -> Result<Vec<NewsItem>, BackendError> {
        let direction = query.direction.as_str();
        let params = news_params(viewer, query).order(format!(
            "{}.{direction},id.{direction}",
            query.order_by.column()
        ));
        self.table().select(viewer, &params, Some(range)).await
    }

    async fn count(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
    ) -> Result<u64, BackendError> {
        self.table().count(viewer, &news_params(viewer, query)).await
    }

    async fn find(
        &self,
        viewer: Option<&Session>,
        id: RecordId,
    ) -> Result<Option<NewsItem>, BackendError> {
        let mut params = Params::default();
        if viewer.is_none() {
            params = params.eq("status", NewsStatus::Published);
        }
        self.table().find(viewer, params, id).await
    }

    async fn insert(
        &self,
        session: &Session,
        item: &NewNewsItem,
    ) -> Result<NewsItem, BackendError> {
        self.table().insert(session, item).await
    }

    async fn update(
        &self,
        session: &Session,
        id: RecordId,
        patch: &NewsPatch,
    ) -> Result<Option<NewsItem>, BackendError> {
        self.table().update(session, id, patch).await
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        self.table().delete(session, id).await
    }
}

#[derive(Debug, Clone)]
pub struct PostgrestDocumentStore {
    client: HostedClient,
}

impl PostgrestDocumentStore {
    pub fn new(client: HostedClient) -> Self {
        PostgrestDocumentStore { client }
    }

    fn table(&self) -> Table<'_> {
        Table::new(&self.client, DOCUMENTS_TABLE)
    }
}

#[derive(serde::Deserialize)]
struct CategoryRow {
    category: String,
}

#[async_trait]
impl DocumentStore for PostgrestDocumentStore {
    async fn list(
        &self,
        query: &DocumentQuery,
        range: RowRange,
    ) -> Result<Vec<Document>, BackendError> {
        let params = document_params(query).order("created_at.desc,id.desc");
        self.table().select(None, &params, Some(range)).await
    }

    async fn count(&self, query: &DocumentQuery) -> Result<u64, BackendError> {
        self.table().count(None, &document_params(query)).await
    }

    async fn find(&self, id: RecordId) -> Result<Option<Document>, BackendError> {
        self.table().find(None, Params::default(), id).await
    }

    async fn categories(&self) -> Result<Vec<String>, BackendError> {
        let params = Params::default()
            .select("category")
            .order("category.asc");
        let rows: Vec<CategoryRow> = self.table().select(None, &params, None).await?;

        let mut categories: Vec<String> = rows.into_iter().map(|row| row.category).collect();
        categories.dedup();
        Ok(categories)
    }

    async fn insert(
        &self,
        session: &Session,
        document: &NewDocument,
    ) -> Result<Document, BackendError> {
        self.table().insert(session, document).await
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        self.table().delete(session, id).await
    }
}

#[derive(Debug, Clone)]
pub struct PostgrestReportStore {
    client: HostedClient,
}

impl PostgrestReportStore {
    pub fn new(client: HostedClient) -> Self {
        PostgrestReportStore { client }
    }

    fn table(&self) -> Table<'_> {
        Table::new(&self.client, REPORTS_TABLE)
    }
}

#[async_trait]
impl ReportStore for PostgrestReportStore {
    async fn list(&self, range: RowRange) -> Result<Vec<SocialReport>, BackendError> {
        let params = Params::default().order("date.desc,created_at.desc,id.desc");
        self.table().select(None, &params, Some(range)).await
    }

    async fn count(&self) -> Result<u64, BackendError> {
        self.table().count(None, &Params::default()).await
    }

    async fn find(&self, id: RecordId) -> Result<Option<SocialReport>, BackendError> {
        self.table().find(None, Params::default(), id).await
    }

    async fn insert(
        &self,
        session: &Session,
        report: &NewSocialReport,
    ) -> Result<SocialReport, BackendError> {
        self.table().insert(session, report).await
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        self.table().delete(session, id).await
    }
}
