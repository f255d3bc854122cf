use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::stores::{PaperStore, SessionStore};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    papers: Arc<dyn PaperStore>,
    sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        papers: Arc<dyn PaperStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, papers, sessions }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn papers(&self) -> &dyn PaperStore {
        self.inner.papers.as_ref()
    }

    pub(crate) fn sessions(&self) -> &dyn SessionStore {
        self.inner.sessions.as_ref()
    }
}
