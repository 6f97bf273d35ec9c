//! The user-facing command surface.
//!
//! [`App::execute`] is the outermost error boundary: every failure ends as a
//! reply to the invoking actor and a log record, never as a panic or a
//! propagated error.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use minijinja::{Value, context};
use tracing::{error, info, instrument, warn};

use crate::core::classifier::ErrorClass;
use crate::core::types::Actor;
use crate::dispatch::DispatchEvent;
use crate::error::{Error, ValidationError};
use crate::io::config::{AppConfig, SUPPORTED_LANGUAGES, load_config, write_config};
use crate::io::fetcher::Fetcher;
use crate::io::host::CommandHost;
use crate::io::messages::Messages;
use crate::io::paths::DataPaths;
use crate::io::persist::JsonFileBackend;
use crate::modes::ModeResolver;
use crate::pipeline::{Pipeline, report_failure};
use crate::store::NamedStore;

pub const PERM_HELP: &str = "cmdlink.help";
pub const PERM_RUN: &str = "cmdlink.run";
pub const PERM_SAVE: &str = "cmdlink.save";
pub const PERM_STORAGE: &str = "cmdlink.storage";
pub const PERM_LANG: &str = "cmdlink.lang";
pub const PERM_RELOAD: &str = "cmdlink.reload";
pub const PERM_MODE: &str = "cmdlink.mode";

/// Subcommands in help order, with the permission each one requires.
const SUBCOMMANDS: [(&str, &str); 8] = [
    ("help", PERM_HELP),
    ("run", PERM_RUN),
    ("save", PERM_SAVE),
    ("savecmd", PERM_SAVE),
    ("storage", PERM_STORAGE),
    ("lang", PERM_LANG),
    ("reload", PERM_RELOAD),
    ("mode", PERM_MODE),
];

const STORAGE_ACTIONS: [&str; 2] = ["delete", "run"];
const MODES: [&str; 2] = ["elevated", "restricted"];

/// Where replies to the invoking actor go.
pub trait Reply {
    fn send(&self, message: &str);
}

/// Replies printed to stdout, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReply;

impl Reply for StdoutReply {
    fn send(&self, message: &str) {
        println!("{message}");
    }
}

/// Long-lived application state shared by every command invocation.
pub struct App<F: Fetcher, H: CommandHost> {
    config: RwLock<AppConfig>,
    messages: RwLock<Messages>,
    config_path: Option<PathBuf>,
    store: NamedStore,
    modes: ModeResolver,
    fetcher: F,
    host: H,
}

impl<F: Fetcher, H: CommandHost> App<F, H> {
    /// Assemble an app. With a `config_path`, `lang` persists the new
    /// language there and `reload` re-reads it.
    pub fn new(
        config: AppConfig,
        config_path: Option<PathBuf>,
        store: NamedStore,
        modes: ModeResolver,
        fetcher: F,
        host: H,
    ) -> Result<Self> {
        let messages = Messages::new(&config.language, &config.messages)?;
        Ok(Self {
            config: RwLock::new(config),
            messages: RwLock::new(messages),
            config_path,
            store,
            modes,
            fetcher,
            host,
        })
    }

    /// Open the stores under `paths` as JSON files.
    pub fn open(paths: &DataPaths, config: AppConfig, fetcher: F, host: H) -> Result<Self> {
        let store = NamedStore::load(Box::new(JsonFileBackend::new(&paths.storage_path)))
            .context("load alias storage")?;
        let modes = ModeResolver::load(Box::new(JsonFileBackend::new(&paths.modes_path)))
            .context("load execution modes")?;
        Self::new(
            config,
            Some(paths.config_path.clone()),
            store,
            modes,
            fetcher,
            host,
        )
    }

    pub fn config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self) -> &NamedStore {
        &self.store
    }

    pub fn modes(&self) -> &ModeResolver {
        &self.modes
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run one invocation: `args[0]` is the subcommand, the rest its arguments.
    #[instrument(skip_all, fields(actor = %actor.id))]
    pub fn execute<S: AsRef<str>>(&self, actor: &Actor, args: &[S], reply: &dyn Reply) {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        if let Err(err) = self.handle(actor, &args, reply) {
            error!(err = format!("{err:#}"), "command failed");
            self.say(reply, "command-error", context! {});
        }
    }

    /// Flush both stores. Failures are logged.
    pub fn shutdown(&self) {
        if let Err(err) = self.store.flush() {
            warn!(err = %err, "failed to flush alias storage");
        }
        if let Err(err) = self.modes.flush() {
            warn!(err = %err, "failed to flush execution modes");
        }
    }

    fn handle(&self, actor: &Actor, args: &[&str], reply: &dyn Reply) -> Result<()> {
        let Some(first) = args.first() else {
            self.say(reply, "no-args", context! {});
            return Ok(());
        };
        let subcommand = first.to_lowercase();
        let Some((_, permission)) = SUBCOMMANDS.iter().find(|(name, _)| *name == subcommand)
        else {
            self.say(reply, "unknown", context! {});
            return Ok(());
        };

        // `mode` checks interactivity before permission.
        if subcommand == "mode" {
            return self.cmd_mode(actor, args, reply);
        }
        if !self.permitted(actor, permission, reply) {
            return Ok(());
        }
        match subcommand.as_str() {
            "help" => self.cmd_help(actor, reply),
            "run" => self.cmd_run(actor, args, reply),
            "save" => self.cmd_save(args, reply),
            "savecmd" => self.cmd_savecmd(args, reply),
            "storage" => self.cmd_storage(actor, args, reply),
            "lang" => self.cmd_lang(args, reply)?,
            "reload" => self.cmd_reload(reply),
            other => {
                return Err(ValidationError::UnknownSubcommand(other.to_string()).into());
            }
        }
        Ok(())
    }

    fn cmd_help(&self, actor: &Actor, reply: &dyn Reply) {
        self.say(reply, "help", context! {});
        for (name, permission) in SUBCOMMANDS {
            if permission == PERM_RELOAD && !actor.has_permission(PERM_RELOAD) {
                continue;
            }
            let desc = self.text(&format!("{name}-desc"));
            self.say(reply, "help-line", context! { cmd => name, desc => desc });
        }
    }

    fn cmd_run(&self, actor: &Actor, args: &[&str], reply: &dyn Reply) {
        let Some(reference) = args.get(1) else {
            self.say(reply, "run-usage", context! {});
            return;
        };
        let cfg = self.config();
        let probe = std::time::Duration::from_millis(cfg.timeouts.internet_check_ms);
        if !self.fetcher.is_reachable(&cfg.fetch.reachability_url, probe) {
            warn!(url = %cfg.fetch.reachability_url, "reachability check failed");
            self.say(reply, "no-internet", context! {});
            return;
        }

        let pipeline = self.pipeline(&cfg);
        let link = pipeline.resolve(reference);
        self.say(reply, "run-start", context! { link => link });
        match pipeline.run_reference(reference, actor, |event| self.report_event(reply, event)) {
            Ok(summary) if summary.lines == 0 => self.say(reply, "run-empty", context! {}),
            Ok(summary) => self.say(
                reply,
                "run-success",
                context! { count => summary.report.dispatched },
            ),
            Err(err) => {
                let class = report_failure(&err, "script run failed");
                let error = self.describe(&class);
                self.say(reply, "run-fail", context! { error => error });
            }
        }
    }

    fn cmd_save(&self, args: &[&str], reply: &dyn Reply) {
        let (Some(reference), Some(name)) = (args.get(1), args.get(2)) else {
            self.say(reply, "save-usage", context! {});
            return;
        };
        self.store.set_link(name, reference);
        self.say(reply, "save-success", context! { link => reference, name => name });
    }

    fn cmd_savecmd(&self, args: &[&str], reply: &dyn Reply) {
        let Some(reference) = args.get(1) else {
            self.say(reply, "savecmd-usage", context! {});
            return;
        };
        let name = args
            .get(2)
            .map_or_else(default_script_name, |name| (*name).to_string());
        let cfg = self.config();
        let pipeline = self.pipeline(&cfg);
        self.say(reply, "savecmd-start", context! { link => pipeline.resolve(reference) });
        match pipeline.capture(reference) {
            Ok(Some(script)) => {
                self.store.set_script(&name, &script.body);
                self.say(
                    reply,
                    "savecmd-success",
                    context! { count => script.line_count, name => name },
                );
            }
            Ok(None) => self.say(reply, "savecmd-empty", context! {}),
            Err(err) => {
                let class = report_failure(&err, "script capture failed");
                let error = self.describe(&class);
                self.say(reply, "savecmd-fail", context! { error => error });
            }
        }
    }

    fn cmd_storage(&self, actor: &Actor, args: &[&str], reply: &dyn Reply) {
        let (Some(name), Some(action)) = (args.get(1), args.get(2)) else {
            self.say(reply, "storage-usage", context! {});
            return;
        };
        if self.store.lookup(name).is_none() {
            self.say(reply, "storage-not-found", context! { name => name });
            return;
        }
        match action.to_lowercase().as_str() {
            "delete" => {
                if self.store.delete(name).is_some() {
                    self.say(reply, "storage-delete", context! { name => name });
                } else {
                    self.say(reply, "storage-not-found", context! { name => name });
                }
            }
            "run" => {
                let cfg = self.config();
                let pipeline = self.pipeline(&cfg);
                self.say(reply, "storage-run-start", context! { name => name });
                let result = pipeline.run_alias(&self.store, name, actor, |event| {
                    self.report_event(reply, event);
                });
                match result {
                    Ok(summary) => self.say(
                        reply,
                        "storage-run-success",
                        context! { name => name, count => summary.report.dispatched },
                    ),
                    Err(Error::Validation(ValidationError::UnknownAlias(_))) => {
                        self.say(reply, "storage-not-found", context! { name => name });
                    }
                    Err(err) => {
                        let class = report_failure(&err, "stored alias run failed");
                        let error = self.describe(&class);
                        self.say(
                            reply,
                            "storage-run-fail",
                            context! { name => name, error => error },
                        );
                    }
                }
            }
            _ => self.say(reply, "storage-action-error", context! {}),
        }
    }

    fn cmd_lang(&self, args: &[&str], reply: &dyn Reply) -> Result<()> {
        let Some(raw) = args.get(1) else {
            self.say(reply, "lang-usage", context! {});
            return Ok(());
        };
        let language = raw.to_lowercase();
        if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
            info!(%language, "rejected language");
            self.say(reply, "lang-invalid", context! {});
            return Ok(());
        }

        let mut cfg = self.config();
        cfg.language = language.clone();
        if let Some(path) = &self.config_path {
            write_config(path, &cfg).context("persist language")?;
        }
        let messages = Messages::new(&cfg.language, &cfg.messages)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = cfg;
        *self.messages.write().unwrap_or_else(PoisonError::into_inner) = messages;
        info!(%language, "language changed");
        self.say(reply, "lang-set", context! { lang => language });
        Ok(())
    }

    fn cmd_reload(&self, reply: &dyn Reply) {
        if let Some(path) = &self.config_path {
            let reloaded = load_config(path).and_then(|cfg| {
                let messages = Messages::new(&cfg.language, &cfg.messages)?;
                Ok((cfg, messages))
            });
            match reloaded {
                Ok((cfg, messages)) => {
                    *self.config.write().unwrap_or_else(PoisonError::into_inner) = cfg;
                    *self.messages.write().unwrap_or_else(PoisonError::into_inner) = messages;
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    error!(err = %error, "config reload failed");
                    self.say(reply, "reload-fail", context! { error => error });
                    return;
                }
            }
        }
        self.shutdown();
        info!("configuration reloaded");
        self.say(reply, "reload-success", context! {});
    }

    fn cmd_mode(&self, actor: &Actor, args: &[&str], reply: &dyn Reply) -> Result<()> {
        if !actor.interactive {
            self.say(reply, "interactive-only", context! {});
            return Ok(());
        }
        if !self.permitted(actor, PERM_MODE, reply) {
            return Ok(());
        }
        let Some(raw) = args.get(1) else {
            self.say(reply, "mode-usage", context! {});
            return Ok(());
        };
        match self.modes.set_mode_str(actor, raw) {
            Ok(mode) => self.say(reply, "mode-set", context! { mode => mode.as_str() }),
            Err(Error::Validation(ValidationError::InvalidMode(_))) => {
                self.say(reply, "mode-invalid", context! {});
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Completion candidates for the word being typed, which is the last
    /// element of `args` (possibly empty).
    pub fn complete<S: AsRef<str>>(&self, actor: &Actor, args: &[S]) -> Vec<String> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let partial = args.last().copied().unwrap_or("");
        let candidates: Vec<String> = match args.as_slice() {
            [] | [_] => SUBCOMMANDS
                .iter()
                .filter(|(_, permission)| actor.has_permission(permission))
                .map(|(name, _)| (*name).to_string())
                .collect(),
            [sub, rest @ ..] => {
                let position = rest.len();
                match (sub.to_lowercase().as_str(), position) {
                    ("run" | "save" | "savecmd", 1) => vec!["<url>".to_string()],
                    ("save" | "savecmd", 2) => vec!["<name>".to_string()],
                    ("storage", 1) => self.store.list_names(),
                    ("storage", 2) => STORAGE_ACTIONS.map(String::from).to_vec(),
                    ("lang", 1) => SUPPORTED_LANGUAGES.map(String::from).to_vec(),
                    ("mode", 1) => MODES.map(String::from).to_vec(),
                    _ => Vec::new(),
                }
            }
        };
        let partial = partial.to_lowercase();
        candidates
            .into_iter()
            .filter(|candidate| {
                candidate.starts_with('<') || candidate.to_lowercase().starts_with(&partial)
            })
            .collect()
    }

    fn pipeline<'a>(&'a self, cfg: &AppConfig) -> Pipeline<'a, F, H> {
        Pipeline::new(&self.fetcher, &self.host, &self.modes, cfg)
    }

    fn permitted(&self, actor: &Actor, permission: &str, reply: &dyn Reply) -> bool {
        if actor.has_permission(permission) {
            return true;
        }
        info!(actor = %actor.id, permission, "permission denied");
        self.say(reply, "no-permission", context! {});
        false
    }

    fn report_event(&self, reply: &dyn Reply, event: DispatchEvent<'_>) {
        match event {
            DispatchEvent::Blocked { command } => {
                self.say(reply, "blocked", context! { cmd => command });
            }
            DispatchEvent::Failed { command, .. } => {
                self.say(reply, "dispatch-failed", context! { cmd => command });
            }
        }
    }

    fn describe(&self, class: &ErrorClass) -> String {
        match (class.message_key(), class) {
            (Some(key), _) => self.text(key),
            (None, ErrorClass::Unknown(raw)) => raw.clone(),
            (None, _) => String::new(),
        }
    }

    fn text(&self, key: &str) -> String {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .text(key)
    }

    fn say(&self, reply: &dyn Reply, key: &str, ctx: Value) {
        let message = self
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .render(key, ctx);
        reply.send(&message);
    }
}

/// `cmd_<unix-millis>`, used when `savecmd` is given no name.
fn default_script_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("cmd_{millis}")
}
