use std::{pin::Pin, sync::Arc};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{sleep, Sleep},
};

use crate::{
    db::message_log::MessageLog,
    domain::{
        DispatchItem, DispatchLimits, LimitsUpdate, Listing, MessageLogEntry, MessageStatus,
        QueueSnapshot,
    },
    infrastructure::shutdown::ShutdownListener,
};

use super::scheduler::{DispatchReport, DispatchScheduler, DrainStep};

#[derive(Debug)]
pub enum DispatchCommand {
    AddBatch(Vec<DispatchItem>),
    Pause,
    Resume,
    SetLimits(LimitsUpdate),
    Snapshot(oneshot::Sender<(QueueSnapshot, Vec<String>)>),
}

#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<DispatchCommand>,
}

impl DispatcherHandle {
    pub fn add_batch(&self, items: Vec<DispatchItem>) {
        self.send(DispatchCommand::AddBatch(items));
    }

    pub fn pause(&self) {
        self.send(DispatchCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(DispatchCommand::Resume);
    }

    pub fn set_limits(&self, update: LimitsUpdate) {
        self.send(DispatchCommand::SetLimits(update));
    }

    pub async fn snapshot(&self) -> Option<(QueueSnapshot, Vec<String>)> {
        let (tx, rx) = oneshot::channel();
        self.send(DispatchCommand::Snapshot(tx));
        rx.await.ok()
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<DispatchCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { commands: tx }, rx)
    }

    fn send(&self, command: DispatchCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!(target: "dispatch", "dispatcher is not running; command dropped");
        }
    }
}

pub struct DispatchProcessor {
    scheduler: DispatchScheduler,
    commands: mpsc::UnboundedReceiver<DispatchCommand>,
    limits: watch::Receiver<DispatchLimits>,
    log: Option<Arc<dyn MessageLog>>,
}

impl DispatchProcessor {
    pub fn new(
        scheduler: DispatchScheduler,
        limits: watch::Receiver<DispatchLimits>,
        log: Option<Arc<dyn MessageLog>>,
    ) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let processor = Self {
            scheduler,
            commands: rx,
            limits,
            log,
        };
        (processor, DispatcherHandle { commands: tx })
    }

    pub fn spawn(self, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(&mut shutdown).await;
        })
    }

    async fn run_loop(mut self, shutdown: &mut ShutdownListener) {
        let mut pacing: Option<Pin<Box<Sleep>>> = None;
        let mut commands_open = true;
        let mut limits_open = true;

        loop {
            if shutdown.is_triggered() {
                break;
            }

            if pacing.is_none() {
                match self.scheduler.process_next().await {
                    DrainStep::Dispatched(report) => {
                        tracing::debug!(
                            target: "dispatch",
                            kind = ?report.pacing.kind,
                            delay_ms = report.pacing.duration.as_millis() as u64,
                            "pacing before next dispatch"
                        );
                        pacing = Some(Box::pin(sleep(report.pacing.duration)));
                        self.record_outcome(report).await;
                    }
                    DrainStep::Idle(reason) => {
                        tracing::trace!(target: "dispatch", ?reason, "drain idle");
                    }
                }
            }

            tokio::select! {
                _ = shutdown.notified() => break,
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.apply(command),
                        None => commands_open = false,
                    }
                }
                changed = self.limits.changed(), if limits_open => {
                    match changed {
                        Ok(()) => {
                            let limits = *self.limits.borrow_and_update();
                            self.scheduler.set_limits(LimitsUpdate {
                                per_hour: Some(limits.per_hour),
                                per_day: Some(limits.per_day),
                            });
                        }
                        Err(_) => limits_open = false,
                    }
                }
                _ = pacing_elapsed(&mut pacing) => {
                    pacing = None;
                    self.scheduler.finish_pacing();
                }
            }
        }
        tracing::info!(
            target: "dispatch",
            queued = self.scheduler.snapshot().queued,
            state = ?self.scheduler.state(),
            "dispatch processor stopped"
        );
    }

    fn apply(&mut self, command: DispatchCommand) {
        match command {
            DispatchCommand::AddBatch(items) => {
                self.scheduler.enqueue(items);
            }
            DispatchCommand::Pause => self.scheduler.pause(),
            DispatchCommand::Resume => {
                self.scheduler.resume();
            }
            DispatchCommand::SetLimits(update) => self.scheduler.set_limits(update),
            DispatchCommand::Snapshot(reply) => {
                let _ = reply.send((self.scheduler.snapshot(), self.scheduler.queued_urls()));
            }
        }
    }

    async fn record_outcome(&self, report: DispatchReport) {
        let Some(log) = &self.log else {
            return;
        };
        let entry = outcome_entry(report);
        if let Err(err) = log.append(&entry).await {
            tracing::warn!(
                target: "dispatch",
                listing_id = %entry.listing_id,
                error = %err,
                "failed to record dispatch outcome"
            );
        }
    }
}

async fn pacing_elapsed(pacing: &mut Option<Pin<Box<Sleep>>>) {
    match pacing {
        Some(delay) => delay.as_mut().await,
        None => std::future::pending().await,
    }
}

fn outcome_entry(report: DispatchReport) -> MessageLogEntry {
    let DispatchReport {
        item,
        message,
        result,
        ..
    } = report;
    let listing_id = item
        .meta("listing_id")
        .map(str::to_string)
        .unwrap_or_else(|| Listing::id_from_url(&item.url));

    let (status, reason) = match result {
        Ok(outcome) => (outcome.status, outcome.reason),
        Err(err) => (MessageStatus::Failed, Some(err.to_string())),
    };

    let mut entry = MessageLogEntry::new(listing_id, item.url.clone(), message, status);
    entry.address = item.meta("address").map(str::to_string);
    entry.owner_name = item.meta("owner_name").map(str::to_string);
    entry.reason = reason;
    if !item.metadata.is_empty() {
        entry.meta = serde_json::to_value(&item.metadata).ok();
    }
    entry
}
