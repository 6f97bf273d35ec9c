//! Fetch-parse-filter-dispatch orchestration.
//!
//! A pipeline is built per action from the current config snapshot. It
//! borrows the long-lived fetcher, host and mode resolver and adds nothing
//! shared of its own.

use tracing::{error, info, instrument};

use crate::core::classifier::{ErrorClass, classify};
use crate::core::lines::{canonical_body, parse_lines};
use crate::core::reference::resolve_reference;
use crate::core::types::Actor;
use crate::dispatch::{DispatchEvent, DispatchReport, Dispatcher};
use crate::error::{Error, Result, ValidationError};
use crate::io::config::AppConfig;
use crate::io::fetcher::{FetchSettings, Fetcher};
use crate::io::host::CommandHost;
use crate::modes::ModeResolver;
use crate::store::{Alias, NamedStore};

/// Outcome of running one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Non-empty command lines in the script.
    pub lines: usize,
    pub report: DispatchReport,
}

/// A fetched script in canonical stored form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedScript {
    pub url: String,
    pub body: String,
    pub line_count: usize,
}

pub struct Pipeline<'a, F: Fetcher, H: CommandHost> {
    fetcher: &'a F,
    dispatcher: Dispatcher<'a, H>,
    raw_host: String,
    settings: FetchSettings,
}

impl<'a, F: Fetcher, H: CommandHost> Pipeline<'a, F, H> {
    pub fn new(fetcher: &'a F, host: &'a H, modes: &'a ModeResolver, cfg: &AppConfig) -> Self {
        Self {
            fetcher,
            dispatcher: Dispatcher::new(host, modes, cfg.blocklist(), cfg.command_delay()),
            raw_host: cfg.fetch.raw_host.clone(),
            settings: FetchSettings::from_config(cfg),
        }
    }

    /// URL a reference expands to.
    pub fn resolve(&self, reference: &str) -> String {
        resolve_reference(reference, &self.raw_host)
    }

    fn fetch_body(&self, reference: &str) -> Result<String> {
        let url = self.resolve(reference);
        let body = self.fetcher.fetch(&url, &self.settings)?;
        Ok(body)
    }

    /// Dispatch the lines of an already available body.
    pub fn run_body<E>(&self, body: &str, actor: &Actor, on_event: E) -> RunSummary
    where
        E: FnMut(DispatchEvent<'_>),
    {
        let commands = parse_lines(body);
        let report = self.dispatcher.dispatch(&commands, actor, on_event);
        RunSummary {
            lines: commands.len(),
            report,
        }
    }

    /// Fetch `reference` and dispatch its lines.
    ///
    /// Nothing is dispatched when the fetch fails.
    #[instrument(skip_all, fields(reference = %reference, actor = %actor.id))]
    pub fn run_reference<E>(&self, reference: &str, actor: &Actor, on_event: E) -> Result<RunSummary>
    where
        E: FnMut(DispatchEvent<'_>),
    {
        let body = self.fetch_body(reference)?;
        let summary = self.run_body(&body, actor, on_event);
        info!(
            lines = summary.lines,
            dispatched = summary.report.dispatched,
            "script finished"
        );
        Ok(summary)
    }

    /// Fetch `reference` and normalize it for storage.
    ///
    /// Returns `None` when the script has no command lines.
    #[instrument(skip_all, fields(reference = %reference))]
    pub fn capture(&self, reference: &str) -> Result<Option<CapturedScript>> {
        let url = self.resolve(reference);
        let body = self.fetcher.fetch(&url, &self.settings)?;
        Ok(canonical_body(&body).map(|body| CapturedScript {
            line_count: body.lines().count(),
            url,
            body,
        }))
    }

    /// Run the alias stored under `name`: the script alias if present,
    /// otherwise the link alias (fetched fresh).
    #[instrument(skip_all, fields(name = %name, actor = %actor.id))]
    pub fn run_alias<E>(
        &self,
        store: &NamedStore,
        name: &str,
        actor: &Actor,
        on_event: E,
    ) -> Result<RunSummary>
    where
        E: FnMut(DispatchEvent<'_>),
    {
        match store.lookup(name) {
            Some(Alias::Script(body)) => Ok(self.run_body(&body, actor, on_event)),
            Some(Alias::Link(reference)) => self.run_reference(&reference, actor, on_event),
            None => Err(ValidationError::UnknownAlias(name.to_string()).into()),
        }
    }
}

/// Classify a pipeline failure for the user and log it in full.
pub fn report_failure(err: &Error, context: &str) -> ErrorClass {
    let class = classify(&err.to_string());
    error!(err = %err, ?class, "{context}");
    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::modes::ModeDocument;
    use crate::store::AliasDocument;
    use crate::test_support::{MemoryBackend, RecordingHost, ScriptedFetcher};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, buffer.contents())
    }

    fn config() -> AppConfig {
        AppConfig {
            command_delay_ms: 0,
            blocked_commands: vec!["op".to_string()],
            ..AppConfig::default()
        }
    }

    fn modes() -> ModeResolver {
        ModeResolver::load(Box::new(MemoryBackend::<ModeDocument>::default())).expect("modes")
    }

    fn store() -> NamedStore {
        NamedStore::load(Box::new(MemoryBackend::<AliasDocument>::default())).expect("store")
    }

    #[test]
    fn short_code_is_fetched_from_raw_host() {
        let fetcher =
            ScriptedFetcher::default().with_body("https://pastebin.com/raw/abc", "say hi\n");
        let host = RecordingHost::default();
        let modes = modes();
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        let summary = pipeline
            .run_reference("abc", &Actor::console(), |_| {})
            .expect("run");

        assert_eq!(summary.report.dispatched, 1);
        assert_eq!(fetcher.requests(), vec!["https://pastebin.com/raw/abc"]);
    }

    #[test]
    fn fetch_failure_dispatches_nothing() {
        let fetcher = ScriptedFetcher::default()
            .with_error("https://example.com/s", FetchError::Status { status: 403 });
        let host = RecordingHost::default();
        let modes = modes();
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        let err = pipeline
            .run_reference("https://example.com/s", &Actor::console(), |_| {})
            .unwrap_err();

        assert_eq!(report_failure(&err, "run failed"), ErrorClass::Forbidden);
        assert!(host.commands().is_empty());
    }

    #[test]
    fn capture_normalizes_body() {
        let fetcher = ScriptedFetcher::default()
            .with_body("https://example.com/s", "  say a \r\n\r\nsay b\n\n say c\n");
        let host = RecordingHost::default();
        let modes = modes();
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        let captured = pipeline
            .capture("https://example.com/s")
            .expect("capture")
            .expect("non-empty");

        assert_eq!(captured.body, "say a\nsay b\nsay c");
        assert_eq!(captured.line_count, 3);
        assert!(host.commands().is_empty());
    }

    #[test]
    fn capture_of_blank_script_is_none() {
        let fetcher = ScriptedFetcher::default().with_body("https://example.com/s", "\n \n");
        let host = RecordingHost::default();
        let modes = modes();
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());
        assert_eq!(pipeline.capture("https://example.com/s").expect("capture"), None);
    }

    #[test]
    fn run_alias_prefers_script_then_falls_back_to_link() {
        let fetcher =
            ScriptedFetcher::default().with_body("https://example.com/x", "say from link\n");
        let host = RecordingHost::default();
        let modes = modes();
        let store = store();
        store.set_link("x", "https://example.com/x");
        store.set_script("x", "say from script");
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        pipeline
            .run_alias(&store, "x", &Actor::console(), |_| {})
            .expect("run script");
        store.delete("x");
        pipeline
            .run_alias(&store, "x", &Actor::console(), |_| {})
            .expect("run link");

        assert_eq!(host.commands(), vec!["say from script", "say from link"]);
        assert_eq!(fetcher.requests(), vec!["https://example.com/x"]);
    }

    #[test]
    fn run_alias_blocks_stored_script_lines() {
        let fetcher = ScriptedFetcher::default();
        let host = RecordingHost::default();
        let modes = modes();
        let store = store();
        store.set_script("s", "op me\nsay ok");
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        let summary = pipeline
            .run_alias(&store, "s", &Actor::console(), |_| {})
            .expect("run");

        assert_eq!(summary.lines, 2);
        assert_eq!(summary.report.blocked, vec!["op me"]);
        assert_eq!(host.commands(), vec!["say ok"]);
    }

    #[test]
    fn spans_record_reference_and_alias_name() {
        let fetcher = ScriptedFetcher::default().with_body("https://example.com/s", "say hi\n");
        let host = RecordingHost::default();
        let modes = modes();
        let store = store();
        store.set_script("nightly", "op me");
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        let (_, logs) = captured_logs(|| {
            pipeline
                .run_reference("https://example.com/s", &Actor::console(), |_| {})
                .expect("run");
            pipeline
                .run_alias(&store, "nightly", &Actor::console(), |_| {})
                .expect("run alias");
        });

        assert!(logs.contains("reference=https://example.com/s"), "logs: {logs}");
        assert!(logs.contains("name=nightly"), "logs: {logs}");
        assert!(logs.contains("actor=console"), "logs: {logs}");
    }

    #[test]
    fn run_alias_unknown_name_is_validation_error() {
        let fetcher = ScriptedFetcher::default();
        let host = RecordingHost::default();
        let modes = modes();
        let store = store();
        let pipeline = Pipeline::new(&fetcher, &host, &modes, &config());

        let err = pipeline
            .run_alias(&store, "missing", &Actor::console(), |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnknownAlias(name)) if name == "missing"
        ));
    }
}
