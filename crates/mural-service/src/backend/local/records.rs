use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use tracing::debug;

use super::{SharedConnection, fold_case, with_connection};
use crate::backend::{DocumentStore, NewsStore, ReportStore};
use crate::errors::BackendError;
use crate::models::{
    Document, NewDocument, NewNewsItem, NewSocialReport, NewsItem, NewsPatch, NewsStatus,
    RecordId, Session, SocialReport,
};
use crate::retrieval::{DocumentQuery, NewsOrder, NewsQuery, RowRange, SortDirection};
use crate::schema::{documents, news, relatorios_sociais};

/// `%needle%`, lower-cased, with LIKE wildcards escaped by `\`. Compare it
/// against `fold_case(column)`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn offset_limit(range: RowRange) -> (i64, i64) {
    (
        i64::try_from(range.start).unwrap_or(i64::MAX),
        i64::try_from(range.limit()).unwrap_or(i64::MAX),
    )
}

#[derive(Clone)]
pub struct SqliteNewsStore {
    db: SharedConnection,
}

impl SqliteNewsStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }
}

/// Anonymous viewers only ever see published rows, whatever the query asks.
fn filtered_news(viewer: Option<&Session>, query: &NewsQuery) -> news::BoxedQuery<'static, Sqlite> {
    let mut statement = news::table.into_boxed();

    if viewer.is_none() {
        statement = statement.filter(news::status.eq(NewsStatus::Published));
    }
    if let Some(status) = query.status {
        statement = statement.filter(news::status.eq(status));
    }
    if let Some(after) = query.created_after {
        statement = statement.filter(news::created_at.ge(after));
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        statement = statement.filter(
            fold_case(news::title.nullable())
                .like(pattern.clone())
                .escape('\\')
                .or(fold_case(news::content.nullable())
                    .like(pattern)
                    .escape('\\')),
        );
    }

    statement
}

#[async_trait]
impl NewsStore for SqliteNewsStore {
    async fn list(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
        range: RowRange,
    ) -> Result<Vec<NewsItem>, BackendError> {
        let statement = filtered_news(viewer, query);
        let statement = match (query.order_by, query.direction) {
            (NewsOrder::CreatedAt, SortDirection::Desc) => {
                statement.order((news::created_at.desc(), news::id.desc()))
            }
            (NewsOrder::CreatedAt, SortDirection::Asc) => {
                statement.order((news::created_at.asc(), news::id.asc()))
            }
            (NewsOrder::Title, SortDirection::Desc) => {
                statement.order((news::title.desc(), news::id.desc()))
            }
            (NewsOrder::Title, SortDirection::Asc) => {
                statement.order((news::title.asc(), news::id.asc()))
            }
        };
        let (offset, limit) = offset_limit(range);

        with_connection(&self.db, |conn| {
            statement
                .offset(offset)
                .limit(limit)
                .load::<NewsItem>(conn)
        })
    }

    async fn count(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
    ) -> Result<u64, BackendError> {
        let statement = filtered_news(viewer, query);
        let total = with_connection(&self.db, |conn| statement.count().get_result::<i64>(conn))?;
        Ok(total.max(0) as u64)
    }

    async fn find(
        &self,
        viewer: Option<&Session>,
        id: RecordId,
    ) -> Result<Option<NewsItem>, BackendError> {
        let item = with_connection(&self.db, |conn| {
            news::table.find(id).first::<NewsItem>(conn).optional()
        })?;
        Ok(item.filter(|item| viewer.is_some() || item.status.is_public()))
    }

    async fn insert(
        &self,
        session: &Session,
        item: &NewNewsItem,
    ) -> Result<NewsItem, BackendError> {
        debug!(actor = %session.email, title = %item.title, "Inserting news item");
        with_connection(&self.db, |conn| {
            diesel::insert_into(news::table)
                .values(item)
                .returning(news::all_columns)
                .get_result::<NewsItem>(conn)
        })
    }

    async fn update(
        &self,
        session: &Session,
        id: RecordId,
        patch: &NewsPatch,
    ) -> Result<Option<NewsItem>, BackendError> {
        debug!(actor = %session.email, id, "Updating news item");
        with_connection(&self.db, |conn| {
            diesel::update(news::table.find(id))
                .set(patch)
                .returning(news::all_columns)
                .get_result::<NewsItem>(conn)
                .optional()
        })
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        debug!(actor = %session.email, id, "Deleting news item");
        let deleted =
            with_connection(&self.db, |conn| diesel::delete(news::table.find(id)).execute(conn))?;
        Ok(deleted > 0)
    }
}

#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: SharedConnection,
}

impl SqliteDocumentStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }
}

fn filtered_documents(query: &DocumentQuery) -> documents::BoxedQuery<'static, Sqlite> {
    let mut statement = documents::table.into_boxed();

    if let Some(category) = &query.category {
        statement = statement.filter(documents::category.eq(category.clone()));
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        statement = statement.filter(
            fold_case(documents::title.nullable())
                .like(pattern.clone())
                .escape('\\')
                .or(fold_case(documents::description).like(pattern).escape('\\')),
        );
    }

    statement
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list(
        &self,
        query: &DocumentQuery,
        range: RowRange,
    ) -> Result<Vec<Document>, BackendError> {
        let statement = filtered_documents(query)
            .order((documents::created_at.desc(), documents::id.desc()));
        let (offset, limit) = offset_limit(range);

        with_connection(&self.db, |conn| {
            statement
                .offset(offset)
                .limit(limit)
                .load::<Document>(conn)
        })
    }

    async fn count(&self, query: &DocumentQuery) -> Result<u64, BackendError> {
        let statement = filtered_documents(query);
        let total = with_connection(&self.db, |conn| statement.count().get_result::<i64>(conn))?;
        Ok(total.max(0) as u64)
    }

    async fn find(&self, id: RecordId) -> Result<Option<Document>, BackendError> {
        with_connection(&self.db, |conn| {
            documents::table.find(id).first::<Document>(conn).optional()
        })
    }

    async fn categories(&self) -> Result<Vec<String>, BackendError> {
        with_connection(&self.db, |conn| {
            documents::table
                .select(documents::category)
                .distinct()
                .order(documents::category.asc())
                .load::<String>(conn)
        })
    }

    async fn insert(
        &self,
        session: &Session,
        document: &NewDocument,
    ) -> Result<Document, BackendError> {
        debug!(actor = %session.email, title = %document.title, "Inserting document");
        with_connection(&self.db, |conn| {
            diesel::insert_into(documents::table)
                .values(document)
                .returning(documents::all_columns)
                .get_result::<Document>(conn)
        })
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        debug!(actor = %session.email, id, "Deleting document");
        let deleted = with_connection(&self.db, |conn| {
            diesel::delete(documents::table.find(id)).execute(conn)
        })?;
        Ok(deleted > 0)
    }
}

#[derive(Clone)]
pub struct SqliteReportStore {
    db: SharedConnection,
}

impl SqliteReportStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn list(&self, range: RowRange) -> Result<Vec<SocialReport>, BackendError> {
        let (offset, limit) = offset_limit(range);
        with_connection(&self.db, |conn| {
            relatorios_sociais::table
                .order((
                    relatorios_sociais::date.desc(),
                    relatorios_sociais::created_at.desc(),
                    relatorios_sociais::id.desc(),
                ))
                .offset(offset)
                .limit(limit)
                .load::<SocialReport>(conn)
        })
    }

    async fn count(&self) -> Result<u64, BackendError> {
        let total = with_connection(&self.db, |conn| {
            relatorios_sociais::table.count().get_result::<i64>(conn)
        })?;
        Ok(total.max(0) as u64)
    }

    async fn find(&self, id: RecordId) -> Result<Option<SocialReport>, BackendError> {
        with_connection(&self.db, |conn| {
            relatorios_sociais::table
                .find(id)
                .first::<SocialReport>(conn)
                .optional()
        })
    }

    async fn insert(
        &self,
        session: &Session,
        report: &NewSocialReport,
    ) -> Result<SocialReport, BackendError> {
        debug!(actor = %session.email, date = %report.date, "Inserting social report");
        with_connection(&self.db, |conn| {
            diesel::insert_into(relatorios_sociais::table)
                .values(report)
                .returning(relatorios_sociais::all_columns)
                .get_result::<SocialReport>(conn)
        })
    }

    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError> {
        debug!(actor = %session.email, id, "Deleting social report");
        let deleted = with_connection(&self.db, |conn| {
            diesel::delete(relatorios_sociais::table.find(id)).execute(conn)
        })?;
        Ok(deleted > 0)
    }
}
