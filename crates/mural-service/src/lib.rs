use std::path::PathBuf;

use axum::Router;
use tower_http::services::ServeDir;

pub mod backend;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod retrieval;
pub mod routes;
pub mod schema;
pub mod services;
pub mod shutdown;
pub mod upload;
pub mod validation;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

use backend::{AuthProvider, Backend};
use services::{
    DocumentService, NewsService, ReadContext, ReportService, Services, StaffService,
};

/// What the HTTP handlers need from the application.
pub trait AppState: Clone + Send + Sync + 'static {
    fn services(&self) -> &Services;

    fn news(&self) -> &NewsService {
        &self.services().news
    }

    fn documents(&self) -> &DocumentService {
        &self.services().documents
    }

    fn reports(&self) -> &ReportService {
        &self.services().reports
    }

    fn staff(&self) -> &StaffService {
        &self.services().staff
    }

    fn auth(&self) -> &dyn AuthProvider {
        self.services().auth.as_ref()
    }
}

#[derive(Clone)]
pub struct DefaultAppState {
    services: Services,
}

impl DefaultAppState {
    pub fn new(backend: Backend, reads: ReadContext) -> Self {
        DefaultAppState {
            services: Services::new(backend, reads),
        }
    }
}

impl AppState for DefaultAppState {
    fn services(&self) -> &Services {
        &self.services
    }
}

/// The full application. `served_storage` is the local blob root, published
/// under `/storage` so the public URLs the local backend hands out resolve.
pub fn create_app<S: AppState>(state: S, served_storage: Option<PathBuf>) -> Router {
    let router = routes::create_router();
    let router = match served_storage {
        Some(root) => router.nest_service("/storage", ServeDir::new(root)),
        None => router,
    };
    router.with_state(state)
}
