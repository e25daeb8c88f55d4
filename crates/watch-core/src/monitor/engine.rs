use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::monitor::evaluate::{self, Evaluation, Policy};
use crate::monitor::state::{EngineState, RecipientId, TargetItem};
use crate::notify::{Dispatcher, Messenger};
use crate::probe::{ProbeReport, Prober, SUBDOMAIN_EXEMPT};
use crate::store::{StoreError, TargetStore};

/// A per-target check failure. Caught at the cycle boundary and converted
/// into a single diagnostic message to the owning recipient.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("store update failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { targets: usize, messages: usize },
    Skipped,
}

/// The periodic checker: enumerates registered targets, probes and
/// evaluates them concurrently, commits state, and dispatches messages.
/// At most one cycle runs at a time; a tick or manual trigger that arrives
/// while a cycle is in flight is skipped, not queued.
pub struct Checker {
    config: WatchConfig,
    policy: Policy,
    store: Arc<dyn TargetStore>,
    prober: Arc<dyn Prober>,
    dispatcher: Dispatcher,
    state: Arc<RwLock<EngineState>>,
    cycle_gate: Mutex<()>,
    last_cycle: RwLock<Option<DateTime<Utc>>>,
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
}

impl Checker {
    pub fn new(
        config: WatchConfig,
        store: Arc<dyn TargetStore>,
        prober: Arc<dyn Prober>,
        messenger: Arc<dyn Messenger>,
        operator: RecipientId,
    ) -> Self {
        let dispatcher = Dispatcher::new(messenger, Arc::clone(&store), operator);
        let policy = Policy::from_config(&config);
        Self {
            config,
            policy,
            store,
            prober,
            dispatcher,
            state: Arc::new(RwLock::new(EngineState::Idle)),
            cycle_gate: Mutex::new(()),
            last_cycle: RwLock::new(None),
            cycles_completed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub async fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.read().await
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped.load(Ordering::Relaxed)
    }

    /// Start the scheduler loop. Idempotent while already active.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write().await;
            if *state == EngineState::Active {
                return;
            }
            *state = EngineState::Active;
        }

        info!(
            interval_secs = self.config.check_interval.as_secs(),
            "Starting check scheduler"
        );

        let this = Arc::clone(self);
        tokio::spawn(this.run_scheduler());
    }

    async fn run_scheduler(self: Arc<Self>) {
        let this = self;
        let mut ticker = tokio::time::interval(this.config.check_interval);
        // A tick that lands while a cycle is still running must be
        // dropped, never queued up behind it.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            {
                let current = *this.state.read().await;
                if current != EngineState::Active {
                    *this.state.write().await = EngineState::Stopped;
                    info!("Check scheduler stopped");
                    break;
                }
            }

            match this.try_run_cycle().await {
                CycleOutcome::Completed { targets, messages } => {
                    debug!(targets, messages, "Check cycle finished");
                }
                CycleOutcome::Skipped => {
                    warn!("Previous check cycle still running, tick skipped");
                }
            }
        }
    }

    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == EngineState::Active {
            *state = EngineState::Stopping;
            info!("Stopping check scheduler");
        }
    }

    /// Run one cycle unless another is already in flight.
    pub async fn try_run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_gate.try_lock() else {
            self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            return CycleOutcome::Skipped;
        };

        let outcome = self.run_cycle().await;
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.write().await = Some(Utc::now());
        outcome
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let targets = match self.store.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(error = %e, "Failed to enumerate targets, cycle skipped");
                return CycleOutcome::Completed {
                    targets: 0,
                    messages: 0,
                };
            }
        };

        let target_count = targets.len();
        let concurrency = self.config.max_concurrent_checks.max(1);
        let message_counts: Vec<usize> = stream::iter(targets.into_iter())
            .map(|target| async move { self.process_target(&target).await })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        CycleOutcome::Completed {
            targets: target_count,
            messages: message_counts.iter().sum(),
        }
    }

    /// Check one target and dispatch whatever the evaluation produced.
    /// Failures stay inside this boundary: the recipient gets a one-line
    /// diagnostic and the rest of the cycle is unaffected.
    async fn process_target(&self, target: &TargetItem) -> usize {
        match self.check_target(target).await {
            Ok(eval) => {
                let count = eval.messages.len();
                self.dispatcher.deliver(target, &eval.messages).await;
                count
            }
            Err(e) => {
                warn!(url = %target.url, error = %e, "Target evaluation failed");
                let diagnostic = format!("Check failed for {}: {}", target.url, e);
                self.dispatcher.send_one(target, &diagnostic).await;
                1
            }
        }
    }

    async fn check_target(&self, target: &TargetItem) -> Result<Evaluation, TargetError> {
        let report = self.prober.probe_all(&target.url).await;
        let now = Utc::now();

        let state = self.store.notification_state(&target.url).await?;
        let eval = evaluate::evaluate(&target.url, &state, &report, &self.policy, now);

        self.store
            .update_status(&target.url, &eval.status, now)
            .await?;
        for (kind, alert) in &eval.changes {
            self.store
                .set_alert_state(&target.url, *kind, *alert)
                .await?;
        }
        for event in &eval.events {
            self.store.append_event(&target.url, event).await?;
        }

        Ok(eval)
    }

    /// Produce and deliver a full status report for one target now.
    /// Serves on-demand user-triggered checks; returns the report text.
    pub async fn status_report(
        &self,
        recipient: RecipientId,
        url: &str,
    ) -> Result<String, TargetError> {
        let report = self.prober.probe_all(url).await;
        self.store
            .update_status(url, &evaluate::composite_status(&report), Utc::now())
            .await?;

        let text = render_report(url, &report);
        let target = TargetItem {
            recipient,
            url: url.to_string(),
            display_name: None,
        };
        self.dispatcher.send_one(&target, &text).await;
        Ok(text)
    }
}

fn render_report(url: &str, report: &ProbeReport) -> String {
    let mut text = format!("{url}\n");
    text.push_str(if report.reachable {
        "Site is up\n"
    } else {
        "Site is down\n"
    });

    if report.cert_days >= 0 {
        let _ = writeln!(text, "SSL: {} days until expiry", report.cert_days);
    } else {
        text.push_str("SSL: could not be checked\n");
    }

    if report.domain.days == SUBDOMAIN_EXEMPT {
        text.push_str("Domain: registration checks do not apply to sub-domains");
    } else {
        if report.domain.days >= 0 {
            let _ = writeln!(text, "Domain: {} days until expiry", report.domain.days);
        } else {
            text.push_str("Domain: could not be checked\n");
        }
        if let Some(ref registrar) = report.domain.registrar {
            let _ = writeln!(text, "Registrar: {registrar}");
        }
        if let Some(ref contact) = report.domain.registrar_url {
            let _ = write!(text, "Registrar site: {contact}");
        }
    }

    text.trim_end().to_string()
}
