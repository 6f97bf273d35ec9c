//! End-to-end scenarios through the command surface with in-memory doubles.
//!
//! Each test drives `App::execute` the way an actor would and checks what was
//! dispatched, what was replied and what the stores hold afterwards.

use cmdlink::commands::{App, PERM_MODE, PERM_RUN, PERM_STORAGE};
use cmdlink::core::types::{Actor, ActorId, Identity};
use cmdlink::error::FetchError;
use cmdlink::io::config::AppConfig;
use cmdlink::test_support::{CapturedReplies, RecordingHost, ScriptedFetcher, memory_app};

fn config() -> AppConfig {
    AppConfig {
        command_delay_ms: 0,
        blocked_commands: vec!["op".to_string()],
        ..AppConfig::default()
    }
}

fn exec(app: &App<ScriptedFetcher, RecordingHost>, actor: &Actor, args: &[&str]) -> Vec<String> {
    let replies = CapturedReplies::default();
    app.execute(actor, args, &replies);
    replies.messages()
}

#[test]
fn blank_lines_dropped_and_blocked_line_reported() {
    let fetcher =
        ScriptedFetcher::default().with_body("https://example.com/s", "say hi\n\nop ban steve\n");
    let app = memory_app(config(), fetcher);

    let replies = exec(&app, &Actor::console(), &["run", "https://example.com/s"]);

    assert_eq!(app.host().commands(), vec!["say hi"]);
    assert!(replies.contains(&"Blocked command: op ban steve".to_string()));
    assert_eq!(replies.last().map(String::as_str), Some("Executed 1 command(s)."));
}

#[test]
fn missing_script_dispatches_nothing() {
    let fetcher = ScriptedFetcher::default()
        .with_error("https://pastebin.com/raw/gone", FetchError::Status { status: 404 });
    let app = memory_app(config(), fetcher);

    let replies = exec(&app, &Actor::console(), &["run", "gone"]);

    assert!(app.host().commands().is_empty());
    assert_eq!(
        replies.last().map(String::as_str),
        Some("Could not run script: script not found")
    );
}

#[test]
fn forbidden_fetch_is_reported_as_blocked_request() {
    let fetcher = ScriptedFetcher::default()
        .with_error("https://example.com/s", FetchError::Status { status: 403 });
    let app = memory_app(config(), fetcher);

    let replies = exec(&app, &Actor::console(), &["run", "https://example.com/s"]);

    assert_eq!(
        replies.last().map(String::as_str),
        Some("Could not run script: the remote host blocked the request")
    );
}

#[test]
fn captured_script_replays_without_refetching() {
    let fetcher = ScriptedFetcher::default()
        .with_body("https://example.com/setup", "say one\r\n  say two  \n\n");
    let app = memory_app(config(), fetcher);
    let console = Actor::console();

    exec(&app, &console, &["savecmd", "https://example.com/setup", "setup"]);
    let replies = exec(&app, &console, &["storage", "setup", "run"]);

    assert_eq!(app.store().get_script("setup").as_deref(), Some("say one\nsay two"));
    assert_eq!(app.host().commands(), vec!["say one", "say two"]);
    assert_eq!(app.fetcher().requests(), vec!["https://example.com/setup"]);
    assert_eq!(
        replies.last().map(String::as_str),
        Some("Finished setup: executed 2 command(s).")
    );
}

#[test]
fn script_alias_shadows_link_until_deleted() {
    let fetcher = ScriptedFetcher::default()
        .with_body("https://example.com/x", "say from link\n")
        .with_body("https://example.com/x-script", "say from script\n");
    let app = memory_app(config(), fetcher);
    let console = Actor::console();

    exec(&app, &console, &["save", "https://example.com/x", "x"]);
    exec(&app, &console, &["savecmd", "https://example.com/x-script", "x"]);

    exec(&app, &console, &["storage", "x", "run"]);
    assert_eq!(app.host().commands(), vec!["say from script"]);

    exec(&app, &console, &["storage", "x", "delete"]);
    assert!(app.store().get_script("x").is_none());
    assert_eq!(app.store().get_link("x").as_deref(), Some("https://example.com/x"));

    exec(&app, &console, &["storage", "x", "run"]);
    assert_eq!(app.host().commands(), vec!["say from script", "say from link"]);
}

#[test]
fn restricted_actor_dispatches_under_own_identity() {
    let fetcher = ScriptedFetcher::default().with_body("https://example.com/s", "say hi\n");
    let app = memory_app(config(), fetcher);
    let alice = Actor::interactive("alice", [PERM_RUN, PERM_MODE, PERM_STORAGE]);

    exec(&app, &alice, &["run", "https://example.com/s"]);
    exec(&app, &alice, &["mode", "restricted"]);
    exec(&app, &alice, &["run", "https://example.com/s"]);
    exec(&app, &Actor::console(), &["run", "https://example.com/s"]);

    let identities: Vec<Identity> = app
        .host()
        .submissions()
        .into_iter()
        .map(|(_, identity)| identity)
        .collect();
    assert_eq!(
        identities,
        vec![
            Identity::Elevated,
            Identity::Actor(ActorId::new("alice")),
            Identity::Elevated,
        ]
    );
}

#[test]
fn unreachable_network_skips_fetch() {
    let app = memory_app(config(), ScriptedFetcher::default());
    app.fetcher().set_reachable(false);

    let replies = exec(&app, &Actor::console(), &["run", "abc"]);

    assert_eq!(replies, vec!["No internet connection."]);
    assert!(app.fetcher().requests().is_empty());
}
