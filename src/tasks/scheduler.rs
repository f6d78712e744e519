use std::{sync::Arc, time::Duration};

use crate::domain::{DispatchItem, DispatchLimits, LimitsUpdate, QueueSnapshot};

use super::{
    actions::{DispatchAction, DispatchError, DispatchOutcome},
    pacing::{Clock, PacingSource},
    queue::DispatchQueue,
    template::MessageTemplate,
    window::RateWindow,
};

const FAILURE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Processing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    Jitter,
    MicroBreak,
    AfterFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub kind: PauseKind,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct DispatchReport {
    pub item: DispatchItem,
    pub message: String,
    pub result: Result<DispatchOutcome, DispatchError>,
    pub pacing: Pacing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    Busy,
    Empty,
    Blocked,
}

#[derive(Debug)]
pub enum DrainStep {
    Dispatched(DispatchReport),
    Idle(IdleReason),
}

/// One instance owns the queue and counters; `processing` stays set from the
/// moment an item is popped until [`DispatchScheduler::finish_pacing`] runs,
/// so at most one dispatch is ever in flight.
pub struct DispatchScheduler {
    queue: DispatchQueue,
    window: RateWindow,
    paused: bool,
    processing: bool,
    in_flight: Option<String>,
    total_dispatched: u64,
    since_micro_break: u32,
    micro_break_every: u32,
    action: Arc<dyn DispatchAction>,
    pacing: Box<dyn PacingSource>,
    clock: Arc<dyn Clock>,
    template: MessageTemplate,
}

impl DispatchScheduler {
    pub fn new(
        limits: DispatchLimits,
        action: Arc<dyn DispatchAction>,
        mut pacing: Box<dyn PacingSource>,
        clock: Arc<dyn Clock>,
        template: MessageTemplate,
    ) -> Self {
        let micro_break_every = pacing.micro_break_interval();
        Self {
            queue: DispatchQueue::new(),
            window: RateWindow::new(limits, clock.now()),
            paused: false,
            processing: false,
            in_flight: None,
            total_dispatched: 0,
            since_micro_break: 0,
            micro_break_every,
            action,
            pacing,
            clock,
            template,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.processing {
            SchedulerState::Processing
        } else if self.paused {
            SchedulerState::Paused
        } else {
            SchedulerState::Idle
        }
    }

    pub fn can_dispatch(&mut self) -> bool {
        self.window.roll(self.clock.now());
        !self.paused && self.window.has_capacity()
    }

    pub fn enqueue(&mut self, items: Vec<DispatchItem>) -> bool {
        let offered = items.len();
        let in_flight = self.in_flight.as_deref();
        let added = self.queue.push_batch(
            items
                .into_iter()
                .filter(|item| Some(item.dedupe_key()) != in_flight),
        );
        tracing::info!(
            target: "dispatch",
            added,
            skipped = offered - added,
            queued = self.queue.len(),
            "items added to dispatch queue"
        );
        !self.processing
    }

    pub fn pause(&mut self) {
        self.paused = true;
        tracing::info!(target: "dispatch", queued = self.queue.len(), "dispatching paused");
    }

    pub fn resume(&mut self) -> bool {
        self.paused = false;
        tracing::info!(target: "dispatch", queued = self.queue.len(), "dispatching resumed");
        !self.queue.is_empty() && !self.processing
    }

    pub fn set_limits(&mut self, update: LimitsUpdate) {
        self.window.apply(update);
        tracing::info!(
            target: "dispatch",
            per_hour = self.window.limits.per_hour,
            per_day = self.window.limits.per_day,
            "dispatch limits applied"
        );
    }

    /// On `Dispatched` the scheduler stays busy until the caller has waited
    /// out `report.pacing` and called [`Self::finish_pacing`].
    pub async fn process_next(&mut self) -> DrainStep {
        if self.processing {
            return DrainStep::Idle(IdleReason::Busy);
        }
        if self.queue.is_empty() {
            return DrainStep::Idle(IdleReason::Empty);
        }
        if !self.can_dispatch() {
            tracing::debug!(
                target: "dispatch",
                paused = self.paused,
                hour = self.window.hour_count,
                day = self.window.day_count,
                "dispatch blocked"
            );
            return DrainStep::Idle(IdleReason::Blocked);
        }

        self.processing = true;
        let Some(item) = self.queue.pop() else {
            self.processing = false;
            return DrainStep::Idle(IdleReason::Empty);
        };
        self.in_flight = Some(item.dedupe_key().to_string());
        let message = self.template.render(&item);
        let result = self.action.dispatch(&item, &message).await;

        let pacing = match &result {
            Ok(outcome) => {
                self.window.record();
                self.total_dispatched += 1;
                tracing::info!(
                    target: "dispatch",
                    url = %item.url,
                    status = %outcome.status,
                    total = self.total_dispatched,
                    hour = self.window.hour_count,
                    cap_hour = self.window.limits.per_hour,
                    day = self.window.day_count,
                    cap_day = self.window.limits.per_day,
                    "item dispatched"
                );
                self.next_pacing()
            }
            Err(err) => {
                tracing::error!(target: "dispatch", url = %item.url, error = %err, "dispatch failed");
                Pacing {
                    kind: PauseKind::AfterFailure,
                    duration: FAILURE_DELAY,
                }
            }
        };

        DrainStep::Dispatched(DispatchReport {
            item,
            message,
            result,
            pacing,
        })
    }

    pub fn finish_pacing(&mut self) {
        self.processing = false;
        self.in_flight = None;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queued: self.queue.len(),
            paused: self.paused,
            processing: self.processing,
            hour_count: self.window.hour_count,
            day_count: self.window.day_count,
            cap_hour: self.window.limits.per_hour,
            cap_day: self.window.limits.per_day,
            total_dispatched: self.total_dispatched,
        }
    }

    pub fn queued_urls(&self) -> Vec<String> {
        self.queue.urls().into_iter().map(str::to_string).collect()
    }

    fn next_pacing(&mut self) -> Pacing {
        self.since_micro_break += 1;
        if self.since_micro_break >= self.micro_break_every {
            self.since_micro_break = 0;
            self.micro_break_every = self.pacing.micro_break_interval();
            let duration = self.pacing.micro_break();
            tracing::info!(
                target: "dispatch",
                secs = duration.as_secs(),
                next_every = self.micro_break_every,
                "taking micro-break"
            );
            Pacing {
                kind: PauseKind::MicroBreak,
                duration,
            }
        } else {
            Pacing {
                kind: PauseKind::Jitter,
                duration: self.pacing.jitter(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        domain::MessageStatus,
        tasks::{
            pacing::testing::{FixedPacing, ManualClock},
            window::HOUR,
        },
    };

    #[derive(Default)]
    struct RecordingAction {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl DispatchAction for RecordingAction {
        async fn dispatch(
            &self,
            item: &DispatchItem,
            _message: &str,
        ) -> Result<DispatchOutcome, DispatchError> {
            self.seen.lock().push(item.url.clone());
            if self.fail_on.as_deref() == Some(item.url.as_str()) {
                return Err(DispatchError::Aborted("boom".into()));
            }
            Ok(DispatchOutcome {
                status: MessageStatus::Sent,
                reason: None,
            })
        }
    }

    fn pacing() -> FixedPacing {
        FixedPacing {
            every: 3,
            jitter: Duration::from_secs(20),
            micro_break: Duration::from_secs(60),
        }
    }

    fn scheduler(
        per_hour: u32,
        action: Arc<RecordingAction>,
        clock: ManualClock,
    ) -> DispatchScheduler {
        DispatchScheduler::new(
            DispatchLimits {
                per_hour,
                per_day: 100,
            },
            action,
            Box::new(pacing()),
            Arc::new(clock),
            MessageTemplate::default(),
        )
    }

    fn items(urls: &[&str]) -> Vec<DispatchItem> {
        urls.iter().map(|u| DispatchItem::new(*u)).collect()
    }

    async fn drain(scheduler: &mut DispatchScheduler) -> (Vec<DispatchReport>, IdleReason) {
        let mut reports = Vec::new();
        loop {
            match scheduler.process_next().await {
                DrainStep::Dispatched(report) => {
                    reports.push(report);
                    scheduler.finish_pacing();
                }
                DrainStep::Idle(reason) => return (reports, reason),
            }
        }
    }

    #[tokio::test]
    async fn hour_cap_holds_third_item_until_rollover() {
        let action = Arc::new(RecordingAction::default());
        let clock = ManualClock::new();
        let mut scheduler = scheduler(2, action.clone(), clock.clone());

        assert!(scheduler.enqueue(items(&["a", "b", "c"])));
        let (reports, reason) = drain(&mut scheduler).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reason, IdleReason::Blocked);
        assert_eq!(scheduler.queued_urls(), vec!["c".to_string()]);

        clock.advance(HOUR);
        let (reports, reason) = drain(&mut scheduler).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reason, IdleReason::Empty);
        assert_eq!(*action.seen.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn pause_blocks_until_resume_and_keeps_order() {
        let action = Arc::new(RecordingAction::default());
        let mut scheduler = scheduler(10, action.clone(), ManualClock::new());
        scheduler.enqueue(items(&["a", "b", "c"]));

        let DrainStep::Dispatched(_) = scheduler.process_next().await else {
            panic!("expected a dispatch");
        };
        // pausing mid-drain does not undo the in-flight dispatch
        scheduler.pause();
        assert_eq!(scheduler.state(), SchedulerState::Processing);
        scheduler.finish_pacing();
        assert_eq!(scheduler.state(), SchedulerState::Paused);

        let (reports, reason) = drain(&mut scheduler).await;
        assert!(reports.is_empty());
        assert_eq!(reason, IdleReason::Blocked);
        assert_eq!(scheduler.queued_urls(), vec!["b".to_string(), "c".to_string()]);

        assert!(scheduler.resume());
        let (reports, _) = drain(&mut scheduler).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(*action.seen.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn reentrant_calls_are_refused_while_busy() {
        let action = Arc::new(RecordingAction::default());
        let mut scheduler = scheduler(10, action.clone(), ManualClock::new());
        scheduler.enqueue(items(&["a", "b"]));

        assert!(matches!(scheduler.process_next().await, DrainStep::Dispatched(_)));
        assert!(!scheduler.enqueue(items(&["c"])));
        assert!(matches!(
            scheduler.process_next().await,
            DrainStep::Idle(IdleReason::Busy)
        ));
        assert_eq!(action.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn listing_in_flight_or_queued_is_not_enqueued_again() {
        let action = Arc::new(RecordingAction::default());
        let mut scheduler = scheduler(10, action.clone(), ManualClock::new());
        scheduler.enqueue(items(&["a", "b"]));

        assert!(matches!(scheduler.process_next().await, DrainStep::Dispatched(_)));
        scheduler.enqueue(items(&["a", "b", "c"]));
        assert_eq!(scheduler.queued_urls(), vec!["b".to_string(), "c".to_string()]);

        scheduler.finish_pacing();
        let (reports, _) = drain(&mut scheduler).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(*action.seen.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn micro_break_every_nth_dispatch() {
        let action = Arc::new(RecordingAction::default());
        let mut scheduler = scheduler(10, action, ManualClock::new());
        scheduler.enqueue(items(&["a", "b", "c", "d", "e", "f"]));

        let (reports, _) = drain(&mut scheduler).await;
        let kinds: Vec<PauseKind> = reports.iter().map(|r| r.pacing.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PauseKind::Jitter,
                PauseKind::Jitter,
                PauseKind::MicroBreak,
                PauseKind::Jitter,
                PauseKind::Jitter,
                PauseKind::MicroBreak,
            ]
        );
        assert_eq!(reports[2].pacing.duration, Duration::from_secs(60));
        assert_eq!(scheduler.snapshot().total_dispatched, 6);
    }

    #[tokio::test]
    async fn failed_dispatch_is_dropped_without_counting() {
        let action = Arc::new(RecordingAction {
            fail_on: Some("b".into()),
            ..Default::default()
        });
        let mut scheduler = scheduler(10, action.clone(), ManualClock::new());
        scheduler.enqueue(items(&["a", "b", "c"]));

        let (reports, reason) = drain(&mut scheduler).await;
        assert_eq!(reason, IdleReason::Empty);
        assert_eq!(reports.len(), 3);
        assert!(reports[1].result.is_err());
        assert_eq!(reports[1].pacing.kind, PauseKind::AfterFailure);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.hour_count, 2);
        assert_eq!(snapshot.total_dispatched, 2);
    }

    #[tokio::test]
    async fn raised_cap_applies_without_restart() {
        let action = Arc::new(RecordingAction::default());
        let mut scheduler = scheduler(1, action, ManualClock::new());
        scheduler.enqueue(items(&["a", "b"]));

        let (reports, reason) = drain(&mut scheduler).await;
        assert_eq!((reports.len(), reason), (1, IdleReason::Blocked));

        scheduler.set_limits(LimitsUpdate {
            per_hour: Some(2),
            per_day: None,
        });
        assert!(scheduler.can_dispatch());
        let (reports, _) = drain(&mut scheduler).await;
        assert_eq!(reports.len(), 1);
    }
}
