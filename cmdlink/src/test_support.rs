//! Test doubles for the persistence, fetch, host and reply seams.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::commands::{App, Reply};
use crate::core::types::Identity;
use crate::error::{Error, FetchError, Result};
use crate::io::config::AppConfig;
use crate::io::fetcher::{FetchSettings, Fetcher};
use crate::io::host::CommandHost;
use crate::io::paths::DataPaths;
use crate::io::persist::Backend;
use crate::modes::{ModeDocument, ModeResolver};
use crate::store::{AliasDocument, NamedStore};

struct MemoryState<D> {
    initial: D,
    flushed: Mutex<Option<D>>,
    flushes: AtomicUsize,
    fail: AtomicBool,
}

/// In-memory [`Backend`]. Clones share state, so a test can keep a handle
/// after boxing one into a store.
pub struct MemoryBackend<D> {
    state: Arc<MemoryState<D>>,
}

impl<D> Clone for MemoryBackend<D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<D: Default> Default for MemoryBackend<D> {
    fn default() -> Self {
        Self::with_document(D::default())
    }
}

impl<D> MemoryBackend<D> {
    /// Backend whose `load` returns `doc` until something is flushed.
    pub fn with_document(doc: D) -> Self {
        Self {
            state: Arc::new(MemoryState {
                initial: doc,
                flushed: Mutex::new(None),
                flushes: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }),
        }
    }

    /// Number of successful flushes.
    pub fn flush_count(&self) -> usize {
        self.state.flushes.load(Ordering::SeqCst)
    }

    /// Make subsequent flushes fail (or succeed again).
    pub fn fail_flushes(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }
}

impl<D: Clone> MemoryBackend<D> {
    /// Last successfully flushed document.
    pub fn snapshot(&self) -> Option<D> {
        self.state.flushed.lock().expect("memory backend").clone()
    }
}

impl<D> Backend<D> for MemoryBackend<D>
where
    D: Clone + Default + Send + Sync,
{
    fn load(&self) -> Result<D> {
        Ok(self
            .snapshot()
            .unwrap_or_else(|| self.state.initial.clone()))
    }

    fn flush(&self, doc: &D) -> Result<()> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(Error::store_io(self.describe(), "flush disabled"));
        }
        *self.state.flushed.lock().expect("memory backend") = Some(doc.clone());
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Host that records submissions and fails the configured commands.
#[derive(Debug, Default)]
pub struct RecordingHost {
    submissions: Mutex<Vec<(String, Identity)>>,
    failing: BTreeSet<String>,
}

impl RecordingHost {
    pub fn failing_on<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            submissions: Mutex::default(),
            failing: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn submissions(&self) -> Vec<(String, Identity)> {
        self.submissions.lock().expect("submissions").clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.submissions()
            .into_iter()
            .map(|(command, _)| command)
            .collect()
    }
}

impl CommandHost for RecordingHost {
    fn submit(&self, command: &str, identity: &Identity) -> Result<()> {
        self.submissions
            .lock()
            .expect("submissions")
            .push((command.to_string(), identity.clone()));
        if self.failing.contains(command) {
            return Err(Error::dispatch(command, "exit status Some(1): scripted failure"));
        }
        Ok(())
    }
}

/// Fetcher with canned responses per URL. Unknown URLs answer HTTP 404.
pub struct ScriptedFetcher {
    responses: BTreeMap<String, std::result::Result<String, FetchError>>,
    reachable: AtomicBool,
    requests: Mutex<Vec<String>>,
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self {
            responses: BTreeMap::new(),
            reachable: AtomicBool::new(true),
            requests: Mutex::default(),
        }
    }
}

impl ScriptedFetcher {
    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub fn with_error(mut self, url: &str, err: FetchError) -> Self {
        self.responses.insert(url.to_string(), Err(err));
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// URLs fetched so far, in order. Reachability probes are not recorded.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests").clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, _settings: &FetchSettings) -> std::result::Result<String, FetchError> {
        self.requests.lock().expect("requests").push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status { status: 404 }))
    }

    fn is_reachable(&self, _url: &str, _timeout: Duration) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Reply sink that keeps every message.
#[derive(Debug, Default)]
pub struct CapturedReplies {
    messages: Mutex<Vec<String>>,
}

impl CapturedReplies {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("replies").clone()
    }

    pub fn last(&self) -> Option<String> {
        self.messages().pop()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl Reply for CapturedReplies {
    fn send(&self, message: &str) {
        self.messages.lock().expect("replies").push(message.to_string());
    }
}

/// App over in-memory stores, the given fetcher and a recording host.
pub fn memory_app(cfg: AppConfig, fetcher: ScriptedFetcher) -> App<ScriptedFetcher, RecordingHost> {
    let store = NamedStore::load(Box::new(MemoryBackend::<AliasDocument>::default()))
        .expect("memory store");
    let modes = ModeResolver::load(Box::new(MemoryBackend::<ModeDocument>::default()))
        .expect("memory modes");
    App::new(cfg, None, store, modes, fetcher, RecordingHost::default()).expect("memory app")
}

/// Data directory in a fresh temp dir. Removed on drop.
pub struct TempDataDir {
    _dir: TempDir,
    pub paths: DataPaths,
}

impl TempDataDir {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let paths = DataPaths::new(dir.path().join("data"));
        paths.ensure_root().expect("data dir");
        Self { _dir: dir, paths }
    }

    pub fn write_storage(&self, doc: &AliasDocument) {
        let raw = serde_json::to_string_pretty(doc).expect("storage json");
        std::fs::write(&self.paths.storage_path, raw).expect("write storage");
    }

    pub fn write_config(&self, cfg: &AppConfig) {
        crate::io::config::write_config(&self.paths.config_path, cfg).expect("write config");
    }

    pub fn read_modes(&self) -> ModeDocument {
        let raw = std::fs::read_to_string(&self.paths.modes_path).expect("read modes");
        serde_json::from_str(&raw).expect("modes json")
    }
}

impl Default for TempDataDir {
    fn default() -> Self {
        Self::new()
    }
}
