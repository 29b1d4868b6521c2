//! EvaluatorService - the evaluator wired onto a bus
//!
//! The engine sits behind a mutex that only the service's own handler
//! touches. The dispatch loop runs that handler serially, so the lock is
//! never contended during normal operation; it exists for the read-only
//! accessors.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{CommandKind, Event, EventCategory, EventPayload, SystemNotice};
use dispatcher::{EventBus, EventHandler, HandlerError, HandlerFuture, Subscription};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace};

use crate::engine::{EvaluationOutcome, EvaluatorConfig, EvaluatorPhase, PostureEvaluator};
use crate::schedule::IntervalSchedule;

const HANDLER_NAME: &str = "posture_evaluator";

/// Categories the evaluator listens to
pub const EVALUATOR_CATEGORIES: [EventCategory; 4] = [
    EventCategory::Calibration,
    EventCategory::Frame,
    EventCategory::Pressure,
    EventCategory::Command,
];

const HEARTBEAT: Duration = Duration::from_secs(5);

type SharedEvaluator = Arc<Mutex<PostureEvaluator>>;

fn lock(state: &SharedEvaluator) -> MutexGuard<'_, PostureEvaluator> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Running evaluator attached to a bus
pub struct EvaluatorService {
    state: SharedEvaluator,
    subscriptions: Vec<Subscription>,
    shutdown_tx: oneshot::Sender<()>,
    idle: JoinHandle<()>,
}

impl EvaluatorService {
    /// Subscribe a fresh evaluator and start its idle task
    ///
    /// Must be called within a tokio runtime.
    #[instrument(name = "evaluator_service_spawn", skip_all)]
    pub fn spawn(
        bus: &EventBus,
        config: EvaluatorConfig,
        schedule: impl IntervalSchedule + 'static,
    ) -> Self {
        let state: SharedEvaluator = Arc::new(Mutex::new(PostureEvaluator::new(config, schedule)));

        let handler: Arc<dyn EventHandler> = Arc::new(EvaluatorHandler {
            state: Arc::clone(&state),
            bus: bus.clone(),
        });
        let subscriptions = EVALUATOR_CATEGORIES
            .into_iter()
            .map(|category| bus.subscribe_shared(category, Arc::clone(&handler)))
            .collect();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let idle = tokio::spawn(idle_loop(Arc::clone(&state), shutdown_rx));

        info!(
            eye_threshold = config.eye_threshold,
            pressure_threshold = config.pressure_threshold,
            cooldown_ms = config.cooldown.as_millis() as u64,
            "Evaluator service started"
        );

        Self {
            state,
            subscriptions,
            shutdown_tx,
            idle,
        }
    }

    pub fn phase(&self) -> EvaluatorPhase {
        lock(&self.state).phase()
    }

    pub fn score(&self) -> u8 {
        lock(&self.state).score()
    }

    /// Unsubscribe every handler and stop the idle task
    #[instrument(name = "evaluator_service_shutdown", skip(self))]
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.idle.await {
            error!(error = %e, "Evaluator idle task failed");
        }
        info!("Evaluator service stopped");
    }
}

async fn idle_loop(state: SharedEvaluator, mut shutdown: oneshot::Receiver<()>) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = heartbeat.tick() => {
                let eval = lock(&state);
                trace!(phase = ?eval.phase(), score = eval.score(), "Evaluator heartbeat");
            }
        }
    }
    debug!("Evaluator idle task exited");
}

struct EvaluatorHandler {
    state: SharedEvaluator,
    bus: EventBus,
}

impl EvaluatorHandler {
    fn step(&self, event: &Event) -> Option<EvaluationOutcome> {
        let now = Instant::now();
        let mut eval = lock(&self.state);
        match event.payload() {
            EventPayload::Calibration(baseline) => {
                eval.on_calibration(baseline.clone(), now);
                None
            }
            EventPayload::Frame(frame) => eval.on_frame(frame.clone(), now),
            EventPayload::Pressure(sample) => eval.on_pressure(*sample, now),
            EventPayload::Command(command) if command.kind == CommandKind::Restart => {
                eval.reset();
                None
            }
            _ => None,
        }
    }

    fn publish(&self, outcome: EvaluationOutcome) -> Result<(), HandlerError> {
        observability::metrics::record_evaluation(&outcome.result);
        let finished = outcome.finished_now.then(|| SystemNotice::SessionFinished {
            score: outcome.result.score,
            elapsed_seconds: outcome.result.elapsed_seconds,
        });

        self.bus
            .publish(outcome.result)
            .map_err(|e| HandlerError::new(HANDLER_NAME, e.to_string()))?;
        if let Some(notice) = finished {
            self.bus
                .publish(notice)
                .map_err(|e| HandlerError::new(HANDLER_NAME, e.to_string()))?;
        }
        Ok(())
    }
}

impl EventHandler for EvaluatorHandler {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    fn handle<'a>(&'a self, event: &'a Event) -> HandlerFuture<'a> {
        Box::pin(async move {
            // Lock released before publishing
            match self.step(event) {
                Some(outcome) => self.publish(outcome),
                None => Ok(()),
            }
        })
    }
}
