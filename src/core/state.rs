use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::code_execution::CodeExecutor;
use crate::services::code_runner::CodeRunner;
use crate::services::notifications::Notifier;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    executor: CodeExecutor,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        runner: Arc<dyn CodeRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let executor =
            CodeExecutor::new(runner, Duration::from_millis(settings.runner().batch_timeout_ms));
        Self { inner: Arc::new(InnerState { settings, db, redis, executor, notifier }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn executor(&self) -> &CodeExecutor {
        &self.inner.executor
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }
}
