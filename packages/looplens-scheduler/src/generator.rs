use crate::config::GeneratorConfig;
use crate::session::Session;
use looplens_core::{FrameKind, SchedulerPhase, Timeline};
use looplens_script::{Interpreter, ScriptError, parse_with_limit};

/// Turns a script into a replayable timeline of scheduler snapshots.
///
/// The generator only holds configuration. Every call to [`generate`]
/// builds its own session, so calls never observe each other's state.
///
/// [`generate`]: TimelineGenerator::generate
#[derive(Debug, Clone, Default)]
pub struct TimelineGenerator {
    config: GeneratorConfig,
}

/// Why the drain loop stopped early.
enum Halt {
    Iterations,
    DeferredBacklog,
}

impl TimelineGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Runs `source` to completion and returns every recorded snapshot.
    ///
    /// Never fails: script errors end the timeline with an error snapshot.
    pub fn generate(&self, source: &str) -> Timeline {
        let span = tracing::debug_span!("generate", lines = source.lines().count());
        let _guard = span.enter();

        let mut session = Session::new(&self.config, source);
        let mut interp = Interpreter::with_limits(self.config.limits());

        session.snap(None, "Idle", SchedulerPhase::Idle);
        session.push_frame("main()", FrameKind::Main, Some(1));
        session.snap(Some(1), "Start script execution", SchedulerPhase::Idle);

        if let Err(err) = self.run(source, &mut session, &mut interp) {
            tracing::warn!(error = %err, "script aborted");
            session.fail(&err);
        }

        let timeline = session.close();
        tracing::debug!(
            snapshots = timeline.len(),
            steps = interp.steps(),
            "timeline generated"
        );
        timeline
    }

    fn run(
        &self,
        source: &str,
        session: &mut Session<'_>,
        interp: &mut Interpreter,
    ) -> Result<(), ScriptError> {
        let program = parse_with_limit(source, self.config.max_nesting)?;
        interp.exec_program(&program, session)?;

        session.pop_frame();
        session.snap(None, "Main script finished", SchedulerPhase::Idle);

        match self.drain(session, interp)? {
            None => Ok(()),
            Some(halt) => {
                match halt {
                    Halt::Iterations => tracing::warn!(
                        limit = self.config.max_iterations,
                        "iteration limit reached"
                    ),
                    Halt::DeferredBacklog => tracing::warn!(
                        limit = self.config.max_deferred_per_checkpoint,
                        "deferred queue never drained"
                    ),
                }
                if self.config.announce_iteration_limit {
                    session.snap(None, "Event Loop: iteration limit reached", SchedulerPhase::Idle);
                }
                Ok(())
            }
        }
    }

    fn drain(
        &self,
        session: &mut Session<'_>,
        interp: &mut Interpreter,
    ) -> Result<Option<Halt>, ScriptError> {
        let mut iteration = 0;

        while session.has_work() {
            if iteration >= self.config.max_iterations {
                return Ok(Some(Halt::Iterations));
            }
            iteration += 1;
            tracing::trace!(iteration, "event loop tick");

            session.snap(None, "Event Loop: Checking Call Stack...", SchedulerPhase::Checking);
            if !session.stack_is_empty() {
                continue;
            }

            if session.has_deferred() {
                session.snap(None, "Event Loop: Microtasks found!", SchedulerPhase::Checking);
            }

            let mut drained = 0;
            while session.has_deferred() {
                if drained >= self.config.max_deferred_per_checkpoint {
                    return Ok(Some(Halt::DeferredBacklog));
                }
                let Some(task) = session.pop_deferred() else {
                    break;
                };
                drained += 1;

                session.snap(
                    None,
                    "Event Loop: Moving Microtask to Call Stack",
                    SchedulerPhase::PromotingDeferred,
                );
                let name = if task.is_continuation() {
                    "Promise Callback"
                } else {
                    "Microtask Callback"
                };
                session.push_frame(name, FrameKind::DeferredCallback, None);
                session.snap(None, "Run Microtask", SchedulerPhase::Idle);

                tracing::debug!(task = task.id, kind = ?task.kind, "running deferred task");
                if let Some(callback) = session.take_callback(&task) {
                    interp.run_callback(callback, session)?;
                }

                session.pop_frame();
                session.snap(None, "Microtask finished", SchedulerPhase::Idle);

                if session.has_deferred() {
                    session.snap(
                        None,
                        "Event Loop: Checking next Microtask...",
                        SchedulerPhase::Checking,
                    );
                }
            }

            if session.has_timers() {
                session.snap(
                    None,
                    "Event Loop: Microtasks empty. Checking Macrotasks...",
                    SchedulerPhase::Checking,
                );
                session.promote_timer();
                session.snap(None, "Timer finished -> Macrotask Queue", SchedulerPhase::Idle);
                session.snap(
                    None,
                    "Event Loop: Moving Macrotask to Call Stack",
                    SchedulerPhase::PromotingReady,
                );

                if let Some(task) = session.pop_ready() {
                    session.push_frame("Timeout Callback", FrameKind::TimerCallback, None);
                    session.snap(None, "Run Macrotask", SchedulerPhase::Idle);

                    tracing::debug!(task = task.id, "running timer task");
                    if let Some(callback) = session.take_callback(&task) {
                        interp.run_callback(callback, session)?;
                    }

                    session.pop_frame();
                    session.snap(None, "Macrotask finished", SchedulerPhase::Idle);
                }
            } else if iteration == 1 && !session.has_deferred() {
                session.snap(None, "Event Loop: No tasks in queues", SchedulerPhase::Checking);
            }
        }

        Ok(None)
    }
}

/// Generates a timeline with the default configuration.
pub fn generate(source: &str) -> Timeline {
    TimelineGenerator::new().generate(source)
}
