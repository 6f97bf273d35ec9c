//! Sequential dispatch of command lines to the host.

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, instrument};

use crate::core::blocklist::Blocklist;
use crate::core::types::{Actor, ExecutionMode, Identity};
use crate::error::Error;
use crate::io::host::CommandHost;
use crate::modes::ModeResolver;

/// Per-command notification emitted while a batch runs.
#[derive(Debug)]
pub enum DispatchEvent<'a> {
    /// The command matched the blocklist and was skipped.
    Blocked { command: &'a str },
    /// The command was submitted but the host reported a failure.
    Failed { command: &'a str, error: &'a Error },
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Commands submitted to the host, successful or not.
    pub dispatched: usize,
    /// Commands skipped by the blocklist, in input order.
    pub blocked: Vec<String>,
    /// Commands the host reported as failed, in input order.
    pub failed: Vec<String>,
}

/// Submits command lines, in order, under each actor's resolved identity.
pub struct Dispatcher<'a, H: CommandHost> {
    host: &'a H,
    modes: &'a ModeResolver,
    blocklist: Blocklist,
    delay: Duration,
}

impl<'a, H: CommandHost> Dispatcher<'a, H> {
    pub fn new(host: &'a H, modes: &'a ModeResolver, blocklist: Blocklist, delay: Duration) -> Self {
        Self {
            host,
            modes,
            blocklist,
            delay,
        }
    }

    /// Identity the actor's next command runs under.
    ///
    /// Resolved per command, so a mode change mid-batch applies to the
    /// remaining commands.
    pub fn identity_for(&self, actor: &Actor) -> Identity {
        match self.modes.resolve(actor) {
            ExecutionMode::Elevated => Identity::Elevated,
            ExecutionMode::Restricted => Identity::Actor(actor.id.clone()),
        }
    }

    /// Dispatch every non-blocked command in `commands`.
    ///
    /// Blocked and failed commands are reported through `on_event` and never
    /// stop the batch. The configured delay follows each submitted command.
    #[instrument(skip_all, fields(actor = %actor.id, commands = commands.len()))]
    pub fn dispatch<S, F>(&self, commands: &[S], actor: &Actor, mut on_event: F) -> DispatchReport
    where
        S: AsRef<str>,
        F: FnMut(DispatchEvent<'_>),
    {
        let mut report = DispatchReport::default();
        for command in commands {
            let command = command.as_ref();
            if self.blocklist.is_blocked(command) {
                info!(command, "blocked command skipped");
                report.blocked.push(command.to_string());
                on_event(DispatchEvent::Blocked { command });
                continue;
            }

            let identity = self.identity_for(actor);
            debug!(command, identity = identity.label(), "dispatching");
            report.dispatched += 1;
            if let Err(err) = self.host.submit(command, &identity) {
                error!(command, err = %err, "failed to execute command");
                report.failed.push(command.to_string());
                on_event(DispatchEvent::Failed {
                    command,
                    error: &err,
                });
            }

            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
        debug!(
            dispatched = report.dispatched,
            blocked = report.blocked.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ActorId;
    use crate::modes::ModeDocument;
    use crate::test_support::{MemoryBackend, RecordingHost};
    use std::sync::Mutex;
    use std::time::Instant;

    fn modes() -> ModeResolver {
        ModeResolver::load(Box::new(MemoryBackend::<ModeDocument>::default())).expect("modes")
    }

    #[test]
    fn blocked_commands_are_skipped_and_reported() {
        let host = RecordingHost::default();
        let modes = modes();
        let dispatcher = Dispatcher::new(&host, &modes, Blocklist::new(["op"]), Duration::ZERO);
        let mut events = Vec::new();

        let report = dispatcher.dispatch(
            &["say hi", "OP ban steve", "say bye"],
            &Actor::console(),
            |event| {
                if let DispatchEvent::Blocked { command } = event {
                    events.push(command.to_string());
                }
            },
        );

        assert_eq!(report.dispatched, 2);
        assert_eq!(report.blocked, vec!["OP ban steve"]);
        assert_eq!(events, vec!["OP ban steve"]);
        assert_eq!(host.commands(), vec!["say hi", "say bye"]);
    }

    #[test]
    fn failures_do_not_abort_batch() {
        let host = RecordingHost::failing_on(["boom"]);
        let modes = modes();
        let dispatcher = Dispatcher::new(&host, &modes, Blocklist::default(), Duration::ZERO);
        let mut failed = Vec::new();

        let report = dispatcher.dispatch(&["one", "boom", "two"], &Actor::console(), |event| {
            if let DispatchEvent::Failed { command, .. } = event {
                failed.push(command.to_string());
            }
        });

        assert_eq!(report.dispatched, 3);
        assert_eq!(report.failed, vec!["boom"]);
        assert_eq!(failed, vec!["boom"]);
        assert_eq!(host.commands(), vec!["one", "boom", "two"]);
    }

    #[test]
    fn restricted_actor_dispatches_as_self() {
        let host = RecordingHost::default();
        let modes = modes();
        let alice = Actor::interactive("alice", ["cmdlink.run"]);
        modes
            .set_mode(&alice, ExecutionMode::Restricted)
            .expect("set mode");
        let dispatcher = Dispatcher::new(&host, &modes, Blocklist::default(), Duration::ZERO);

        dispatcher.dispatch(&["say hi"], &alice, |_| {});
        dispatcher.dispatch(&["say hi"], &Actor::console(), |_| {});

        let identities: Vec<Identity> = host.submissions().into_iter().map(|(_, id)| id).collect();
        assert_eq!(
            identities,
            vec![Identity::Actor(ActorId::new("alice")), Identity::Elevated]
        );
    }

    struct SwitchingHost<'a> {
        modes: &'a ModeResolver,
        actor: Actor,
        seen: Mutex<Vec<Identity>>,
    }

    impl CommandHost for SwitchingHost<'_> {
        fn submit(&self, command: &str, identity: &Identity) -> crate::error::Result<()> {
            self.seen.lock().expect("seen").push(identity.clone());
            if command == "restrict" {
                self.modes.set_mode(&self.actor, ExecutionMode::Restricted)?;
            }
            Ok(())
        }
    }

    #[test]
    fn mode_change_mid_batch_applies_to_remaining_commands() {
        let modes = modes();
        let alice = Actor::interactive("alice", ["cmdlink.run"]);
        let host = SwitchingHost {
            modes: &modes,
            actor: alice.clone(),
            seen: Mutex::new(Vec::new()),
        };
        let dispatcher = Dispatcher::new(&host, &modes, Blocklist::default(), Duration::ZERO);

        dispatcher.dispatch(&["first", "restrict", "third"], &alice, |_| {});

        let seen = host.seen.into_inner().expect("seen");
        assert_eq!(
            seen,
            vec![
                Identity::Elevated,
                Identity::Elevated,
                Identity::Actor(ActorId::new("alice")),
            ]
        );
    }

    #[test]
    fn delay_follows_each_dispatched_command() {
        let host = RecordingHost::default();
        let modes = modes();
        let dispatcher = Dispatcher::new(
            &host,
            &modes,
            Blocklist::new(["op"]),
            Duration::from_millis(30),
        );
        let start = Instant::now();
        let report = dispatcher.dispatch(&["a", "op x", "b"], &Actor::console(), |_| {});
        assert_eq!(report.dispatched, 2);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
