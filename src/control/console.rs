use std::{fmt::Write as _, sync::Arc};

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::{
    db::{listings::ListingLogRepository, message_log::MessageLogRepository, settings::LimitsStore},
    domain::LimitsUpdate,
    infrastructure::shutdown::ShutdownListener,
    tasks::processor::DispatcherHandle,
};

const HELP: &str = "commands: pause | resume | limits <per_hour> [per_day] | status | help";
const RECENT_ENTRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Limits(LimitsUpdate),
    Status,
    Help,
}

pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };
    let command = match command.to_ascii_lowercase().as_str() {
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "limits" => {
            let per_hour = parse_cap(parts.next(), "per_hour")?;
            let per_day = match parts.next() {
                Some(raw) => Some(parse_cap(Some(raw), "per_day")?),
                None => None,
            };
            ConsoleCommand::Limits(LimitsUpdate {
                per_hour: Some(per_hour),
                per_day,
            })
        }
        other => return Err(format!("unknown command {other:?}; {HELP}")),
    };
    Ok(Some(command))
}

fn parse_cap(raw: Option<&str>, name: &str) -> Result<u32, String> {
    let raw = raw.ok_or_else(|| format!("{name} is required; {HELP}"))?;
    raw.parse::<u32>()
        .map_err(|_| format!("{name} must be a non-negative integer, got {raw:?}"))
}

pub struct ConsoleController {
    dispatcher: DispatcherHandle,
    limits: Arc<LimitsStore>,
    message_log: MessageLogRepository,
    listing_log: ListingLogRepository,
}

impl ConsoleController {
    pub fn new(
        dispatcher: DispatcherHandle,
        limits: Arc<LimitsStore>,
        message_log: MessageLogRepository,
        listing_log: ListingLogRepository,
    ) -> Self {
        Self {
            dispatcher,
            limits,
            message_log,
            listing_log,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut lines = BufReader::new(io::stdin()).lines();
        let mut stdout = io::stdout();

        loop {
            let line = tokio::select! {
                _ = shutdown.notified() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(target: "lifecycle", error = %err, "console input failed");
                    break;
                }
            };

            let reply = match parse_command(&line) {
                Ok(Some(command)) => self.execute(command).await,
                Ok(None) => continue,
                Err(message) => message,
            };
            if stdout.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
        tracing::debug!(target: "lifecycle", "console closed");
    }

    pub async fn execute(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Pause => {
                self.dispatcher.pause();
                "dispatch paused".to_string()
            }
            ConsoleCommand::Resume => {
                self.dispatcher.resume();
                "dispatch resumed".to_string()
            }
            ConsoleCommand::Limits(update) => match self.limits.update(update).await {
                Ok(limits) => format!("limits set: {}/hour, {}/day", limits.per_hour, limits.per_day),
                Err(err) => {
                    tracing::warn!(target: "db", error = %err, "failed to persist limits");
                    self.dispatcher.set_limits(update);
                    "settings store unavailable; limits applied until restart".to_string()
                }
            },
            ConsoleCommand::Status => self.status().await,
            ConsoleCommand::Help => HELP.to_string(),
        }
    }

    async fn status(&self) -> String {
        let mut out = String::new();
        match self.dispatcher.snapshot().await {
            Some((snapshot, urls)) => {
                let _ = writeln!(
                    out,
                    "queued {} | paused {} | processing {} | hour {}/{} | day {}/{} | dispatched {}",
                    snapshot.queued,
                    snapshot.paused,
                    snapshot.processing,
                    snapshot.hour_count,
                    snapshot.cap_hour,
                    snapshot.day_count,
                    snapshot.cap_day,
                    snapshot.total_dispatched
                );
                for url in urls.iter().take(RECENT_ENTRIES as usize) {
                    let _ = writeln!(out, "  next: {url}");
                }
            }
            None => {
                let _ = writeln!(out, "dispatcher is not running");
            }
        }

        match (
            self.listing_log.count_by_status("KEPT").await,
            self.listing_log.count_by_status("DROPPED").await,
        ) {
            (Ok(kept), Ok(dropped)) => {
                let _ = writeln!(out, "listings logged: {kept} kept, {dropped} dropped");
            }
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(target: "db", error = %err, "listing counts unavailable");
            }
        }

        match self.message_log.recent(RECENT_ENTRIES).await {
            Ok(entries) => {
                for entry in entries {
                    let _ = writeln!(
                        out,
                        "  {} {} {}{}",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.status,
                        entry.listing_id,
                        entry.reason.map(|r| format!(" ({r})")).unwrap_or_default()
                    );
                }
            }
            Err(err) => tracing::warn!(target: "db", error = %err, "message log unavailable"),
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{settings::SettingsRepository, test_pool},
        domain::DispatchLimits,
        tasks::processor::DispatchCommand,
    };

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("PAUSE"), Ok(Some(ConsoleCommand::Pause)));
        assert_eq!(parse_command("resume"), Ok(Some(ConsoleCommand::Resume)));
        assert_eq!(
            parse_command("limits 10 40"),
            Ok(Some(ConsoleCommand::Limits(LimitsUpdate {
                per_hour: Some(10),
                per_day: Some(40),
            })))
        );
        assert_eq!(
            parse_command("limits 5"),
            Ok(Some(ConsoleCommand::Limits(LimitsUpdate {
                per_hour: Some(5),
                per_day: None,
            })))
        );
        assert!(parse_command("limits").is_err());
        assert!(parse_command("limits -1").is_err());
        assert!(parse_command("send now").is_err());
    }

    #[tokio::test]
    async fn limits_persist_and_pause_reaches_dispatcher() {
        let (pool, _dir) = test_pool().await;
        let store = Arc::new(
            LimitsStore::load(SettingsRepository::new(pool.clone()), DispatchLimits::default())
                .await
                .unwrap(),
        );
        let mut limits_rx = store.subscribe();
        let (handle, mut commands) = DispatcherHandle::detached();
        let console = ConsoleController::new(
            handle,
            store.clone(),
            MessageLogRepository::new(pool.clone()),
            ListingLogRepository::new(pool),
        );

        let reply = console
            .execute(ConsoleCommand::Limits(LimitsUpdate {
                per_hour: Some(3),
                per_day: Some(9),
            }))
            .await;
        assert_eq!(reply, "limits set: 3/hour, 9/day");
        assert!(limits_rx.has_changed().unwrap());
        assert_eq!(store.current(), DispatchLimits { per_hour: 3, per_day: 9 });

        console.execute(ConsoleCommand::Pause).await;
        assert!(matches!(commands.try_recv(), Ok(DispatchCommand::Pause)));
    }
}
