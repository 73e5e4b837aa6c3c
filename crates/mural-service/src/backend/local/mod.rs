use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use super::Backend;
use crate::errors::BackendError;

mod auth;
mod records;
mod storage;

pub use auth::LocalAuth;
pub use records::{SqliteDocumentStore, SqliteNewsStore, SqliteReportStore};
pub use storage::FsBlobStorage;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type SharedConnection = Arc<Mutex<SqliteConnection>>;

diesel::define_sql_function! {
    /// Unicode lower-casing. SQLite's `lower()` and `LIKE` only fold ASCII.
    fn fold_case(text: Nullable<Text>) -> Nullable<Text>;
}

/// Opens `database` (a path or `:memory:`) and brings its schema up to date.
pub fn establish(database: &str) -> Result<SharedConnection, BackendError> {
    let mut connection = SqliteConnection::establish(database)
        .map_err(|err| BackendError::Unavailable(format!("cannot open {database}: {err}")))?;

    fold_case_utils::register_impl(&mut connection, |text: Option<String>| {
        text.map(|text| text.to_lowercase())
    })
    .map_err(|err| BackendError::Unavailable(format!("cannot register fold_case: {err}")))?;

    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| BackendError::Unavailable(format!("migrations failed: {err}")))?;

    Ok(Arc::new(Mutex::new(connection)))
}

pub(crate) fn with_connection<T>(
    db: &SharedConnection,
    query: impl FnOnce(&mut SqliteConnection) -> QueryResult<T>,
) -> Result<T, BackendError> {
    let mut conn = db
        .lock()
        .map_err(|_| BackendError::Unavailable("database connection poisoned".to_string()))?;
    Ok(query(&mut conn)?)
}

/// SQLite records, filesystem buckets and local staff accounts.
pub struct LocalBackend {
    db: SharedConnection,
    storage: FsBlobStorage,
    auth: LocalAuth,
}

impl LocalBackend {
    pub fn open(
        database: &str,
        storage_root: PathBuf,
        public_base_url: &str,
        api_key: &str,
    ) -> Result<Self, BackendError> {
        Ok(Self::from_connection(
            establish(database)?,
            storage_root,
            public_base_url,
            api_key,
        ))
    }

    pub fn from_connection(
        db: SharedConnection,
        storage_root: PathBuf,
        public_base_url: &str,
        api_key: &str,
    ) -> Self {
        LocalBackend {
            storage: FsBlobStorage::new(storage_root, public_base_url),
            auth: LocalAuth::new(db.clone(), api_key),
            db,
        }
    }

    pub fn connection(&self) -> SharedConnection {
        self.db.clone()
    }

    pub fn auth(&self) -> &LocalAuth {
        &self.auth
    }

    pub fn into_backend(self) -> Backend {
        let served_storage = Some(self.storage.root().to_path_buf());
        let auth = Arc::new(self.auth);
        Backend {
            news: Arc::new(SqliteNewsStore::new(self.db.clone())),
            documents: Arc::new(SqliteDocumentStore::new(self.db.clone())),
            reports: Arc::new(SqliteReportStore::new(self.db)),
            storage: Arc::new(self.storage),
            auth: auth.clone(),
            staff: auth,
            served_storage,
        }
    }
}
