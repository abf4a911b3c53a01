use chrono::Utc;
use dashmap::DashSet;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use crate::alerting::{evaluate, StateTransition};
use crate::checks::CheckRunner;
use crate::db::enums::ChannelType;
use crate::db::models::{AlertChannel, CheckResult, Monitor, MonitorId, MonitorStateUpdate, NewAlertHistory};
use crate::db::store::{MonitorStore, StoreError};
use crate::notifications::{
    CredentialResolver, JobBuildError, JobBuilder, OrganizationCredentials,
};
use crate::queue::{DispatchError, Dispatcher, QueueName};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub worker_pool_size: usize,
    pub tick_interval: Duration,
    pub due_batch_size: u64,
}

impl From<&WorkerConfig> for SchedulerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            worker_pool_size: config.worker_pool_size,
            tick_interval: config.tick_interval(),
            due_batch_size: config.due_batch_size,
        }
    }
}

/// What one scheduling cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub due: usize,
    pub checked: usize,
    pub skipped_in_flight: usize,
    pub transitions: usize,
    pub jobs_enqueued: usize,
    pub job_failures: usize,
}

impl CycleReport {
    fn absorb(&mut self, outcome: MonitorOutcome) {
        self.checked += 1;
        self.transitions += usize::from(outcome.transitioned);
        self.jobs_enqueued += outcome.jobs_enqueued;
        self.job_failures += outcome.job_failures;
    }
}

/// Live counters since the worker started.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    cycles: AtomicU64,
    checks: AtomicU64,
    skipped_in_flight: AtomicU64,
    transitions: AtomicU64,
    jobs_enqueued: AtomicU64,
    job_failures: AtomicU64,
    last_cycle_at_ms: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub checks: u64,
    pub skipped_in_flight: u64,
    pub transitions: u64,
    pub jobs_enqueued: u64,
    pub job_failures: u64,
    pub last_cycle_at_ms: Option<i64>,
}

impl SchedulerStats {
    fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.checks.fetch_add(report.checked as u64, Ordering::Relaxed);
        self.skipped_in_flight
            .fetch_add(report.skipped_in_flight as u64, Ordering::Relaxed);
        self.transitions
            .fetch_add(report.transitions as u64, Ordering::Relaxed);
        self.jobs_enqueued
            .fetch_add(report.jobs_enqueued as u64, Ordering::Relaxed);
        self.job_failures
            .fetch_add(report.job_failures as u64, Ordering::Relaxed);
        self.last_cycle_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last = self.last_cycle_at_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            checks: self.checks.load(Ordering::Relaxed),
            skipped_in_flight: self.skipped_in_flight.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            job_failures: self.job_failures.load(Ordering::Relaxed),
            last_cycle_at_ms: (last > 0).then_some(last),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MonitorOutcome {
    transitioned: bool,
    jobs_enqueued: usize,
    job_failures: usize,
}

#[derive(Error, Debug)]
enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Build(#[from] JobBuildError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Removes a monitor from the in-flight set when its task ends, however it ends.
struct InFlightGuard {
    in_flight: Arc<DashSet<MonitorId>>,
    monitor_id: MonitorId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.monitor_id);
    }
}

/// Drives due monitors through check, evaluation and alert dispatch.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn MonitorStore>,
    runner: Arc<dyn CheckRunner>,
    credentials: Arc<CredentialResolver>,
    builder: Arc<JobBuilder>,
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashSet<MonitorId>>,
    stats: Arc<SchedulerStats>,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        runner: Arc<dyn CheckRunner>,
        credentials: Arc<CredentialResolver>,
        builder: Arc<JobBuilder>,
        dispatcher: Arc<Dispatcher>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            store,
            runner,
            credentials,
            builder,
            dispatcher,
            permits: Arc::new(Semaphore::new(options.worker_pool_size.max(1))),
            in_flight: Arc::new(DashSet::new()),
            stats: Arc::new(SchedulerStats::default()),
            options,
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Ticks until `shutdown` flips to true, then waits for running cycles.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.options.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();
        info!(
            worker_pool_size = self.options.worker_pool_size,
            tick_interval_ms = self.options.tick_interval.as_millis() as u64,
            "Scheduler started."
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    while cycles.try_join_next().is_some() {}
                    let scheduler = self.clone();
                    cycles.spawn(async move { scheduler.run_once().await });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(running_cycles = cycles.len(), "Scheduler stopping; waiting for running cycles.");
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduler cycle task failed.");
            }
        }
        info!("Scheduler stopped.");
    }

    /// Runs one cycle over the monitors due now and waits for their tasks.
    pub async fn run_once(&self) -> CycleReport {
        let now = Utc::now();
        let mut report = CycleReport::default();

        let monitors = match self
            .store
            .due_monitors(now, self.options.due_batch_size)
            .await
        {
            Ok(monitors) => monitors,
            Err(e) => {
                error!(error = %e, "Failed to load due monitors.");
                self.stats.record(&report);
                return report;
            }
        };

        let mut tasks = JoinSet::new();
        for monitor in monitors.into_iter().filter(|m| m.is_due(now)) {
            report.due += 1;
            if !self.in_flight.insert(monitor.id) {
                debug!(monitor_id = monitor.id, "Previous check still in flight; skipping.");
                report.skipped_in_flight += 1;
                continue;
            }
            let guard = InFlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                monitor_id: monitor.id,
            };
            let scheduler = self.clone();
            tasks.spawn(async move {
                let _guard = guard;
                scheduler.process_monitor(monitor).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => report.absorb(outcome),
                Ok(None) => {}
                Err(e) => error!(error = %e, "Monitor task failed."),
            }
        }

        if report.due > 0 {
            debug!(?report, "Scheduler cycle finished.");
        }
        self.stats.record(&report);
        report
    }

    async fn process_monitor(&self, monitor: Monitor) -> Option<MonitorOutcome> {
        let result = {
            let _permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(monitor_id = monitor.id, error = %e, "Worker pool closed.");
                    return None;
                }
            };
            self.runner.run(&monitor).await
        };

        if let Err(e) = self.store.record_check_result(&result).await {
            error!(monitor_id = monitor.id, error = %e, "Failed to record check result.");
        }

        let evaluation = evaluate(
            monitor.status,
            monitor.streak,
            monitor.config.confirmation_threshold(),
            &result,
        );
        let update = MonitorStateUpdate {
            status: evaluation.status,
            streak: evaluation.streak,
            checked_at: result.checked_at,
            next_check_at: monitor.next_check_after(result.checked_at),
        };
        let stored = match self
            .store
            .update_monitor_state(monitor.organization_id, monitor.id, update)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                // Without the new status persisted the next check would alert again.
                error!(monitor_id = monitor.id, error = %e, "Failed to update monitor state.");
                return Some(MonitorOutcome::default());
            }
        };

        let mut outcome = MonitorOutcome::default();
        let Some(transition) = evaluation.transition else {
            return Some(outcome);
        };
        if stored != evaluation.status {
            info!(
                monitor_id = monitor.id,
                status = %stored,
                dropped = %transition.to,
                "Monitor paused during check; transition dropped."
            );
            return Some(outcome);
        }
        outcome.transitioned = true;
        info!(
            monitor_id = monitor.id,
            organization_id = monitor.organization_id,
            from = %transition.from,
            to = %transition.to,
            severity = %transition.severity,
            "Monitor status changed."
        );

        if transition.notify {
            self.notify(&monitor, &result, &transition, &mut outcome).await;
        }
        Some(outcome)
    }

    async fn notify(
        &self,
        monitor: &Monitor,
        result: &CheckResult,
        transition: &StateTransition,
        outcome: &mut MonitorOutcome,
    ) {
        let channels = match self
            .store
            .alert_channels_for(monitor.organization_id, monitor.id, transition.alert_status)
            .await
        {
            Ok(channels) => channels,
            Err(e) => {
                error!(monitor_id = monitor.id, error = %e, "Failed to load alert channels.");
                return;
            }
        };
        if channels.is_empty() {
            debug!(monitor_id = monitor.id, "No alert channels bound to monitor.");
            return;
        }

        let credentials = if channels.iter().any(|c| c.channel_type == ChannelType::Email) {
            Some(self.email_credentials(monitor).await)
        } else {
            None
        };

        for channel in &channels {
            match self
                .deliver(monitor, result, transition, channel, credentials.as_ref())
                .await
            {
                Ok(queue) => {
                    debug!(
                        monitor_id = monitor.id,
                        channel_id = channel.id,
                        %queue,
                        "Notification job enqueued."
                    );
                    outcome.jobs_enqueued += 1;
                }
                Err(e) => {
                    warn!(
                        monitor_id = monitor.id,
                        channel_id = channel.id,
                        channel_type = %channel.channel_type,
                        error = %e,
                        "Failed to deliver notification job."
                    );
                    outcome.job_failures += 1;
                }
            }
        }
    }

    async fn email_credentials(&self, monitor: &Monitor) -> OrganizationCredentials {
        match self.credentials.resolve(monitor.organization_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(
                    organization_id = monitor.organization_id,
                    error = %e,
                    "Failed to resolve organisation email credentials; using platform email."
                );
                OrganizationCredentials::platform_default(monitor.organization_id)
            }
        }
    }

    async fn deliver(
        &self,
        monitor: &Monitor,
        result: &CheckResult,
        transition: &StateTransition,
        channel: &AlertChannel,
        credentials: Option<&OrganizationCredentials>,
    ) -> Result<QueueName, DeliveryError> {
        // Anything that can fail for this channel alone fails before history is written.
        let prepared = self.builder.prepare(monitor, result, transition, channel)?;
        self.dispatcher.resolve(prepared.channel_type())?;

        let open_incident = self
            .store
            .last_alert_for_channel(monitor.organization_id, monitor.id, channel.id)
            .await?
            .filter(|last| last.is_open())
            .map(|last| last.incident_id);

        let entry = self
            .store
            .create_alert_history(
                monitor.organization_id,
                NewAlertHistory {
                    monitor_id: monitor.id,
                    channel_id: channel.id,
                    incident_id: open_incident,
                    status: transition.alert_status,
                    message: self.builder.history_message(prepared.template_data()),
                },
            )
            .await?;

        let job = self
            .builder
            .finish(prepared, entry.id, entry.incident_id, credentials);
        Ok(self.dispatcher.dispatch(job).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertStatus, CheckOutcome, MonitorStatus, MonitorType};
    use crate::db::memory_store::MemoryStore;
    use crate::notifications::jobs::{EventAction, NotificationJob};
    use crate::queue::{ChannelQueue, JobQueue};
    use crate::test_support::{channel, monitor, policy};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::{mpsc, Notify};

    /// Returns queued outcomes in order, then successes.
    #[derive(Default)]
    struct ScriptedRunner {
        outcomes: Mutex<Vec<CheckOutcome>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        started: Arc<Notify>,
    }

    impl ScriptedRunner {
        fn new(outcomes: &[CheckOutcome]) -> Self {
            let mut outcomes = outcomes.to_vec();
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CheckRunner for ScriptedRunner {
        async fn run(&self, monitor: &Monitor) -> CheckResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(CheckOutcome::Success);
            match outcome {
                CheckOutcome::Failure => CheckResult::failure(monitor, "Connection failed: refused"),
                other => CheckResult::new(monitor, other).with_latency(120).with_status_code(200),
            }
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        runner: Arc<ScriptedRunner>,
        scheduler: Scheduler,
        receivers: Vec<(QueueName, mpsc::Receiver<NotificationJob>)>,
    }

    impl Harness {
        fn new(store: MemoryStore, runner: ScriptedRunner, queues: &[QueueName]) -> Self {
            let store = Arc::new(store);
            let runner = Arc::new(runner);
            let mut dispatcher = Dispatcher::new();
            let mut receivers = Vec::new();
            for name in queues {
                let (queue, rx) = ChannelQueue::new(*name, 16, Duration::from_millis(50));
                dispatcher.register(Arc::new(queue) as Arc<dyn JobQueue>);
                receivers.push((*name, rx));
            }
            let scheduler = Scheduler::new(
                store.clone(),
                runner.clone(),
                Arc::new(CredentialResolver::new(store.clone(), None)),
                Arc::new(JobBuilder::new("https://status.example.com", None).unwrap()),
                Arc::new(dispatcher),
                SchedulerOptions {
                    worker_pool_size: 4,
                    tick_interval: Duration::from_millis(10),
                    due_batch_size: 100,
                },
            );
            Self {
                store,
                runner,
                scheduler,
                receivers,
            }
        }

        fn drain(&mut self, name: QueueName) -> Vec<NotificationJob> {
            let mut jobs = Vec::new();
            if let Some((_, rx)) = self.receivers.iter_mut().find(|(n, _)| *n == name) {
                while let Ok(job) = rx.try_recv() {
                    jobs.push(job);
                }
            }
            jobs
        }

        /// Makes the monitor due again, as if its frequency had elapsed.
        fn make_due(&self, monitor_id: MonitorId) {
            let mut monitor = self.store.monitor(monitor_id).unwrap();
            monitor.next_check_at = None;
            self.store.insert_monitor(monitor);
        }
    }

    fn store_with(status: MonitorStatus, channels: Vec<AlertChannel>) -> MemoryStore {
        let store = MemoryStore::new();
        let mut m = monitor(MonitorType::Https, "https://api.example.com/health");
        m.status = status;
        store.insert_monitor(m);
        let channel_ids = channels.iter().map(|c| c.id).collect();
        for c in channels {
            store.insert_channel(c);
        }
        store.insert_policy(policy(
            1,
            channel_ids,
            vec![AlertStatus::Down, AlertStatus::Degraded, AlertStatus::Recovered],
        ));
        store
    }

    fn slack(id: i32) -> AlertChannel {
        channel(id, ChannelType::Slack, json!({"webhookUrl": "https://hooks.slack.com/services/T/B/X"}))
    }

    #[tokio::test]
    async fn failure_takes_monitor_down_and_alerts_slack() {
        let store = store_with(MonitorStatus::Active, vec![slack(5)]);
        let mut h = Harness::new(store, ScriptedRunner::new(&[CheckOutcome::Failure]), &[QueueName::Slack]);

        let report = h.scheduler.run_once().await;
        assert_eq!(
            report,
            CycleReport {
                due: 1,
                checked: 1,
                skipped_in_flight: 0,
                transitions: 1,
                jobs_enqueued: 1,
                job_failures: 0,
            }
        );

        let stored = h.store.monitor(1).unwrap();
        assert_eq!(stored.status, MonitorStatus::Down);
        assert!(stored.next_check_at.unwrap() > Utc::now());
        assert_eq!(h.store.check_results(1).len(), 1);

        let history = h.store.alert_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, AlertStatus::Down);

        let jobs = h.drain(QueueName::Slack);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].alert_history_id(), history[0].id);
        let NotificationJob::Chat(chat) = &jobs[0] else {
            panic!("expected a chat job");
        };
        let text = chat.payload.to_string();
        assert!(text.contains("down"));
        assert!(text.contains("API"));
    }

    #[tokio::test]
    async fn paused_monitor_is_never_checked() {
        let store = store_with(MonitorStatus::Paused, vec![slack(5)]);
        let h = Harness::new(store, ScriptedRunner::new(&[CheckOutcome::Failure]), &[QueueName::Slack]);

        let report = h.scheduler.run_once().await;
        assert_eq!(report, CycleReport::default());
        assert_eq!(h.runner.calls(), 0);
        assert_eq!(h.store.monitor(1).unwrap().status, MonitorStatus::Paused);
    }

    #[tokio::test]
    async fn broken_channel_does_not_block_siblings() {
        let broken = channel(6, ChannelType::Webhook, json!({"url": ""}));
        let store = store_with(MonitorStatus::Active, vec![broken, slack(7)]);
        let mut h = Harness::new(
            store,
            ScriptedRunner::new(&[CheckOutcome::Failure]),
            &[QueueName::Slack, QueueName::Webhook],
        );

        let report = h.scheduler.run_once().await;
        assert_eq!(report.jobs_enqueued, 1);
        assert_eq!(report.job_failures, 1);
        assert_eq!(h.drain(QueueName::Slack).len(), 1);
        assert!(h.drain(QueueName::Webhook).is_empty());

        let history = h.store.alert_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].channel_id, 7);
    }

    #[tokio::test]
    async fn broken_channel_leaves_no_open_incident() {
        let broken = channel(5, ChannelType::Slack, json!({"webhookUrl": ""}));
        let store = store_with(MonitorStatus::Active, vec![broken]);
        let h = Harness::new(store, ScriptedRunner::new(&[CheckOutcome::Failure]), &[QueueName::Slack]);

        let report = h.scheduler.run_once().await;
        assert_eq!(report.job_failures, 1);
        assert!(h.store.alert_history().is_empty());
        assert!(h
            .store
            .last_alert_for_channel(10, 1, 5)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unprovisioned_queue_counts_as_failure() {
        let store = store_with(MonitorStatus::Active, vec![slack(5)]);
        let h = Harness::new(store, ScriptedRunner::new(&[CheckOutcome::Failure]), &[QueueName::Email]);

        let report = h.scheduler.run_once().await;
        assert_eq!(report.transitions, 1);
        assert_eq!(report.job_failures, 1);
        // The status change still sticks.
        assert_eq!(h.store.monitor(1).unwrap().status, MonitorStatus::Down);
        assert!(h.store.alert_history().is_empty());
    }

    #[tokio::test]
    async fn pause_during_check_drops_the_alert() {
        let store = store_with(MonitorStatus::Active, vec![slack(5)]);
        let gate = Arc::new(Notify::new());
        let runner = ScriptedRunner {
            gate: Some(gate.clone()),
            ..ScriptedRunner::new(&[CheckOutcome::Failure])
        };
        let mut h = Harness::new(store, runner, &[QueueName::Slack]);

        let cycle = {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.run_once().await })
        };
        h.runner.started.notified().await;
        h.store.set_monitor_paused(10, 1, true).await.unwrap();
        gate.notify_one();

        let report = cycle.await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.transitions, 0);
        assert_eq!(report.jobs_enqueued, 0);
        assert_eq!(h.store.monitor(1).unwrap().status, MonitorStatus::Paused);
        assert_eq!(h.store.check_results(1).len(), 1);
        assert!(h.store.alert_history().is_empty());
        assert!(h.drain(QueueName::Slack).is_empty());
    }

    #[tokio::test]
    async fn recovery_resolves_the_same_pagerduty_incident() {
        let pd = channel(8, ChannelType::PagerDuty, json!({"routingKey": "R0UT1NG"}));
        let store = store_with(MonitorStatus::Active, vec![pd]);
        let mut h = Harness::new(
            store,
            ScriptedRunner::new(&[CheckOutcome::Failure, CheckOutcome::Success]),
            &[QueueName::Webhook],
        );

        h.scheduler.run_once().await;
        h.make_due(1);
        let report = h.scheduler.run_once().await;
        assert_eq!(report.transitions, 1);
        assert_eq!(h.store.monitor(1).unwrap().status, MonitorStatus::Active);

        let jobs = h.drain(QueueName::Webhook);
        let events: Vec<_> = jobs
            .iter()
            .map(|job| match job {
                NotificationJob::PagerDuty(pd) => (pd.event_action, pd.dedup_key.clone()),
                other => panic!("unexpected job {other:?}"),
            })
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, EventAction::Trigger);
        assert_eq!(events[1].0, EventAction::Resolve);
        assert_eq!(events[0].1, events[1].1);

        let history = h.store.alert_history();
        assert_eq!(history[1].incident_id, history[0].id);
        assert!(!history[1].is_open());
    }

    #[tokio::test]
    async fn repeated_failure_alerts_once() {
        let store = store_with(MonitorStatus::Active, vec![slack(5)]);
        let mut h = Harness::new(
            store,
            ScriptedRunner::new(&[CheckOutcome::Failure, CheckOutcome::Failure]),
            &[QueueName::Slack],
        );

        h.scheduler.run_once().await;
        h.make_due(1);
        let second = h.scheduler.run_once().await;
        assert_eq!(second.checked, 1);
        assert_eq!(second.transitions, 0);
        assert_eq!(h.drain(QueueName::Slack).len(), 1);
    }

    #[tokio::test]
    async fn first_healthy_result_does_not_notify() {
        let store = store_with(MonitorStatus::Pending, vec![slack(5)]);
        let mut h = Harness::new(store, ScriptedRunner::new(&[CheckOutcome::Success]), &[QueueName::Slack]);

        let report = h.scheduler.run_once().await;
        assert_eq!(report.transitions, 1);
        assert_eq!(report.jobs_enqueued, 0);
        assert_eq!(h.store.monitor(1).unwrap().status, MonitorStatus::Active);
        assert!(h.drain(QueueName::Slack).is_empty());
        assert!(h.store.alert_history().is_empty());
    }

    #[tokio::test]
    async fn monitor_still_in_flight_is_skipped() {
        let store = store_with(MonitorStatus::Active, vec![]);
        let gate = Arc::new(Notify::new());
        let runner = ScriptedRunner {
            gate: Some(gate.clone()),
            ..ScriptedRunner::new(&[])
        };
        let h = Harness::new(store, runner, &[]);

        let first = {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.run_once().await })
        };
        h.runner.started.notified().await;
        assert_eq!(h.scheduler.in_flight(), 1);

        let second = h.scheduler.run_once().await;
        assert_eq!(second.due, 1);
        assert_eq!(second.skipped_in_flight, 1);
        assert_eq!(second.checked, 0);

        gate.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.checked, 1);
        assert_eq!(h.scheduler.in_flight(), 0);
        assert_eq!(h.runner.calls(), 1);

        let stats = h.scheduler.stats().snapshot();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.checks, 1);
        assert_eq!(stats.skipped_in_flight, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = store_with(MonitorStatus::Active, vec![]);
        let h = Harness::new(store, ScriptedRunner::new(&[]), &[]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(h.scheduler.clone().run(shutdown_rx));
        time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(h.runner.calls() >= 1);
        assert!(h.scheduler.stats().snapshot().cycles >= 1);
    }
}
