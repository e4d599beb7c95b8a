// src/remote/registry.rs

//! One directory session per agency
//!
//! The registry connects lazily: the first request for an agency opens the
//! backend, checks the stage layout and caches the session for the rest of the
//! process. Distinct agencies never share a session.

use super::{DirectoryBackend, RemoteSession};
use crate::error::Result;
use crate::stage::StageRegistry;
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Caller identity selecting the directory server credentials
///
/// The unnamed agency uses the default login from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Agency(Option<String>);

impl Agency {
    pub fn named(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<Option<String>> for Agency {
    fn from(name: Option<String>) -> Self {
        Self(name.filter(|n| !n.is_empty()))
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "agency '{}'", name),
            None => write!(f, "default agency"),
        }
    }
}

/// Opens a directory backend for an agency
pub trait Connector {
    fn connect(&self, agency: &Agency) -> Result<Box<dyn DirectoryBackend>>;
}

impl<F> Connector for F
where
    F: Fn(&Agency) -> Result<Box<dyn DirectoryBackend>>,
{
    fn connect(&self, agency: &Agency) -> Result<Box<dyn DirectoryBackend>> {
        self(agency)
    }
}

/// Keyed cache of connected sessions
pub struct SessionRegistry {
    connector: Box<dyn Connector>,
    stages: StageRegistry,
    sessions: HashMap<Agency, RemoteSession>,
}

impl SessionRegistry {
    pub fn new(connector: Box<dyn Connector>, stages: StageRegistry) -> Self {
        Self {
            connector,
            stages,
            sessions: HashMap::new(),
        }
    }

    /// Session for `agency`, connecting on first use
    pub fn session(&mut self, agency: &Agency) -> Result<&RemoteSession> {
        if !self.sessions.contains_key(agency) {
            info!("Connecting to directory server as {}", agency);
            let backend = self.connector.connect(agency)?;
            let session = RemoteSession::new(backend, self.stages.clone());
            session.ensure_layout()?;
            self.sessions.insert(agency.clone(), session);
        }
        // Inserted above when missing.
        Ok(&self.sessions[agency])
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop the session for `agency`; the next request reconnects
    pub fn close(&mut self, agency: &Agency) -> bool {
        self.sessions.remove(agency).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDirectory;
    use std::sync::{Arc, Mutex};

    fn counting_registry(servers: &MemoryDirectory) -> (SessionRegistry, Arc<Mutex<Vec<Agency>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let server = servers.clone();
        let connector = move |agency: &Agency| -> Result<Box<dyn DirectoryBackend>> {
            seen.lock().unwrap().push(agency.clone());
            Ok(Box::new(server.clone()))
        };
        (
            SessionRegistry::new(Box::new(connector), StageRegistry::default()),
            calls,
        )
    }

    #[test]
    fn test_session_is_reused_per_agency() {
        let server = MemoryDirectory::new();
        let (mut registry, calls) = counting_registry(&server);

        registry.session(&Agency::named("ag1")).unwrap();
        registry.session(&Agency::named("ag1")).unwrap();
        registry.session(&Agency::named("ag2")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Agency::named("ag1"), Agency::named("ag2")]
        );
    }

    #[test]
    fn test_connect_creates_stage_layout() {
        let server = MemoryDirectory::new();
        let (mut registry, _) = counting_registry(&server);
        registry.session(&Agency::default()).unwrap();

        assert!(server.is_dir("/share/1_open"));
        assert!(server.is_dir("/share/3_deploy"));
        assert!(server.is_dir("/share/4_done"));
    }

    #[test]
    fn test_close_forces_reconnect() {
        let server = MemoryDirectory::new();
        let (mut registry, calls) = counting_registry(&server);
        let agency = Agency::named("ag1");

        registry.session(&agency).unwrap();
        assert!(registry.close(&agency));
        assert!(registry.is_empty());
        registry.session(&agency).unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_agency_from_empty_name_is_default() {
        assert_eq!(Agency::from(Some(String::new())), Agency::default());
        assert_eq!(Agency::from(None).to_string(), "default agency");
        assert_eq!(Agency::named("ag1").name(), Some("ag1"));
    }
}
