//! In-memory session store

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::SessionRecord;
use crate::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct Store {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord) {
        self.sessions.write().insert(record.token.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Run `f` on a session under the write lock, after refreshing its phase
    pub fn with_session<R>(
        &self,
        token: &str,
        f: impl FnOnce(&mut SessionRecord) -> AppResult<R>,
    ) -> AppResult<R> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .get_mut(token)
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
        record.refresh(Utc::now());
        f(record)
    }
}
