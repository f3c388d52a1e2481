//! Registry of live sessions and their admitted applications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::application::Application;
use crate::error::AdmissionError;
use crate::session::Session;

/// Shared map from session to admitted application record.
///
/// The registry is the single owner of `Application` records: a record
/// exists exactly while its session is live and its admission was
/// accepted. Application ids are unique case-insensitively across all
/// live records.
#[derive(Default)]
pub struct AppRegistry {
    inner: Mutex<HashMap<Uuid, Entry>>,
}

#[derive(Clone)]
struct Entry {
    session: Arc<Session>,
    app: Arc<Application>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `app` for `session`. Fails if any live record carries the
    /// same id (case-insensitive).
    pub fn insert(
        &self,
        session: Arc<Session>,
        app: Arc<Application>,
    ) -> Result<(), AdmissionError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if inner
            .values()
            .any(|entry| entry.app.id().eq_ignore_ascii_case(app.id()))
        {
            return Err(AdmissionError::DuplicateId);
        }

        inner.insert(session.id(), Entry { session, app });
        Ok(())
    }

    /// Case-insensitive membership check by application id.
    pub fn has_id(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .values()
            .any(|entry| entry.app.id().eq_ignore_ascii_case(id))
    }

    /// Snapshot copy of all live (session, application) pairs.
    pub fn snapshot(&self) -> Vec<(Arc<Session>, Arc<Application>)> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .values()
            .map(|entry| (entry.session.clone(), entry.app.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the record for `session_id`, if any. The caller owns closing
    /// the session and signaling any outstanding prompt.
    pub fn remove_session(&self, session_id: Uuid) -> Option<Arc<Application>> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .remove(&session_id)
            .map(|entry| entry.app)
    }

    /// Remove an application by id: wakes a blocked prompt, closes the
    /// session, drops the record.
    pub async fn remove_by_id(&self, id: &str) -> bool {
        let entry = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            let session_id = inner
                .iter()
                .find(|(_, entry)| entry.app.id().eq_ignore_ascii_case(id))
                .map(|(session_id, _)| *session_id);
            session_id.and_then(|sid| inner.remove(&sid))
        };

        match entry {
            Some(entry) => {
                if entry.app.is_requesting() {
                    entry.app.signal_close();
                }
                entry.session.close().await;
                tracing::info!(
                    id = entry.app.id(),
                    name = entry.app.name(),
                    "Application removed"
                );
                true
            }
            None => false,
        }
    }

    /// Tear down every record: wake blocked prompts, close all sessions,
    /// clear the map.
    pub async fn shutdown_all(&self) {
        let entries: Vec<Entry> = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            inner.drain().map(|(_, entry)| entry).collect()
        };

        for entry in entries {
            if entry.app.is_requesting() {
                entry.app.signal_close();
            }
            entry.session.close().await;
        }
    }
}
