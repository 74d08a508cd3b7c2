//! Per-user and per-session context, persisted as two JSON documents.
//!
//! `users.json` and `sessions.json` live under a configurable data
//! directory, are loaded into memory at start and rewritten whole on every
//! meaningful mutation (temp file + rename, so a crash mid-write leaves the
//! previous document intact). Only active sessions are written back.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("create data dir {path}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("encode context: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which kind of front-end owns a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Voice,
    Text,
    Web,
    Mobile,
}

impl Default for InterfaceKind {
    fn default() -> Self {
        InterfaceKind::Voice
    }
}

/// Durable per-user state, persisted across restarts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default = "default_location")]
    pub current_location: String,
    #[serde(default = "default_language")]
    pub preferred_language: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    pub last_activity: DateTime<Utc>,
}

fn default_location() -> String {
    "unknown".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_timezone() -> String {
    "UTC".into()
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_location: default_location(),
            preferred_language: default_language(),
            timezone: default_timezone(),
            preferences: BTreeMap::new(),
            last_activity: Utc::now(),
        }
    }
}

/// Conversation state scoped to one user-interface conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub interface_type: InterfaceKind,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub command_history: Vec<String>,
    #[serde(default)]
    pub response_history: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub last_intent: String,
    #[serde(default)]
    pub last_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub last_used_service: String,
    #[serde(default)]
    pub service_state: BTreeMap<String, String>,
}

impl SessionContext {
    /// A session is active iff it was accessed within the TTL window.
    pub fn is_active(&self, ttl: Duration) -> bool {
        Utc::now() - self.last_accessed < ttl
    }
}

/// Partial in-place session update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct SessionUpdate {
    pub last_intent: Option<String>,
    pub last_parameters: Option<BTreeMap<String, String>>,
    pub last_used_service: Option<String>,
    pub variables: Option<BTreeMap<String, String>>,
}

/// Persistent store of users and sessions with cheap lookups and session
/// expiry.
///
/// # Interaction
///
/// Mutated by the request-handling path (history, last-turn fields) and by
/// the cleanup loop; both serialize on the internal locks, and every save
/// rewrites the documents whole.
pub struct ContextStore {
    data_dir: PathBuf,
    ttl: Duration,
    history_cap: usize,
    users: Mutex<HashMap<String, UserContext>>,
    sessions: Mutex<HashMap<String, SessionContext>>,
}

impl ContextStore {
    /// Opens (creating the data directory if needed) and loads both
    /// documents. Directory creation failure is fatal to the caller.
    pub fn open(
        data_dir: impl Into<PathBuf>,
        ttl_minutes: i64,
        history_cap: usize,
    ) -> Result<Self, ContextError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| ContextError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        let users = load_document(&data_dir.join("users.json"));
        let sessions = load_document(&data_dir.join("sessions.json"));
        info!(
            users = users.len(),
            sessions = sessions.len(),
            dir = %data_dir.display(),
            "loaded context store"
        );

        Ok(Self {
            data_dir,
            ttl: Duration::minutes(ttl_minutes),
            history_cap,
            users: Mutex::new(users),
            sessions: Mutex::new(sessions),
        })
    }

    pub fn session_ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a new session and persists it.
    pub fn create_session(&self, user_id: &str, interface_type: InterfaceKind) -> String {
        let session_id = format!("sess_{}", Uuid::new_v4().simple());
        let now = Utc::now();
        let session = SessionContext {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            interface_type,
            created_at: now,
            last_accessed: now,
            command_history: Vec::new(),
            response_history: Vec::new(),
            variables: BTreeMap::new(),
            last_intent: String::new(),
            last_parameters: BTreeMap::new(),
            last_used_service: String::new(),
            service_state: BTreeMap::new(),
        };
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.clone(), session);
        self.save();
        info!(session = %session_id, user = %user_id, "created session");
        session_id
    }

    /// Returns the session only while active, touching `last_accessed`.
    pub fn get_session(&self, session_id: &str) -> Option<SessionContext> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.get_mut(session_id)?;
        if !session.is_active(self.ttl) {
            return None;
        }
        session.last_accessed = Utc::now();
        Some(session.clone())
    }

    /// Applies a partial update to an active session and persists.
    pub fn update_session(&self, session_id: &str, update: SessionUpdate) {
        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            if let Some(intent) = update.last_intent {
                session.last_intent = intent;
            }
            if let Some(params) = update.last_parameters {
                session.last_parameters = params;
            }
            if let Some(service) = update.last_used_service {
                session.last_used_service = service;
            }
            if let Some(vars) = update.variables {
                session.variables.extend(vars);
            }
            session.last_accessed = Utc::now();
        }
        self.save();
    }

    /// Appends one exchange to the session's histories, truncating each to
    /// the configured cap, and persists.
    pub fn add_to_history(&self, session_id: &str, command: &str, response: &str) {
        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            session.command_history.push(command.to_string());
            session.response_history.push(response.to_string());
            if session.command_history.len() > self.history_cap {
                let excess = session.command_history.len() - self.history_cap;
                session.command_history.drain(..excess);
            }
            if session.response_history.len() > self.history_cap {
                let excess = session.response_history.len() - self.history_cap;
                session.response_history.drain(..excess);
            }
            session.last_accessed = Utc::now();
        }
        self.save();
    }

    /// Fetches the user, creating the record on first sight, and touches
    /// `last_activity`.
    pub fn touch_user(&self, user_id: &str) -> UserContext {
        let user = {
            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            let user = users
                .entry(user_id.to_string())
                .or_insert_with(|| UserContext::new(user_id));
            user.last_activity = Utc::now();
            user.clone()
        };
        self.save();
        user
    }

    /// Drops inactive sessions in bulk; persists once when anything was
    /// removed. Returns the number of dropped sessions.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let before = sessions.len();
            sessions.retain(|_, s| s.is_active(self.ttl));
            before - sessions.len()
        };
        if removed > 0 {
            info!(removed, "cleaned up expired sessions");
            self.save();
        }
        removed
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.is_active(self.ttl))
            .count()
    }

    /// Rewrites both documents. Failures are logged, not propagated: losing
    /// one save must not fail the command that triggered it.
    fn save(&self) {
        if let Err(e) = self.save_inner() {
            warn!(error = %e, "context save failed");
        }
    }

    fn save_inner(&self) -> Result<(), ContextError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner()).clone();
        write_document(&self.data_dir.join("users.json"), &users)?;

        let sessions: HashMap<String, SessionContext> = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, s)| s.is_active(self.ttl))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        write_document(&self.data_dir.join("sessions.json"), &sessions)?;
        Ok(())
    }
}

fn load_document<T: serde::de::DeserializeOwned>(path: &Path) -> HashMap<String, T> {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable context document, starting empty");
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}

fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), ContextError> {
    let text = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(|source| ContextError::Write {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| ContextError::Write {
        path: path.to_path_buf(),
        source,
    })
}
