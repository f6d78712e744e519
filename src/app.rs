use std::{io::IsTerminal, sync::Arc, time::Duration};

use anyhow::Result;
use chrono_tz::Tz;
use futures::FutureExt;
use reqwest::Client;
use sqlx::sqlite::SqlitePool;
use tokio::{sync::Mutex, task::JoinHandle, time::timeout};
use tokio_cron_scheduler::JobScheduler;

use crate::{
    classify::HeuristicTables,
    config::{AppConfig, DispatchMode},
    control::ConsoleController,
    db::{
        self,
        listings::ListingLogRepository,
        message_log::{MessageLog, MessageLogRepository},
        settings::{LimitsStore, SettingsRepository},
    },
    export::SheetExporter,
    guard::DuplicateGuard,
    infrastructure::{
        directories::ResolvedPaths,
        instance_guard::{InstanceGuard, DEFAULT_MAX_WAIT},
        shutdown::Shutdown,
    },
    scrape::{
        HttpRenderer, LeadIntake, PageSignalExtractor, ScrapePipeline, ScrapeRequest,
    },
    tasks::{
        actions::{BrowserOpenAction, DispatchAction, DryRunAction, WebhookAction},
        cron::{configure_scrape_jobs, ScrapeCallback},
        pacing::{RandomPacing, TokioClock},
        processor::DispatchProcessor,
        scheduler::DispatchScheduler,
        template::MessageTemplate,
    },
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LeadPipelineApp {
    _lock: Option<InstanceGuard>,
    _paths: ResolvedPaths,
    scheduler: Option<JobScheduler>,
    processor_handle: JoinHandle<()>,
    console: ConsoleController,
    runner: Arc<ScrapeRunner>,
    pool: SqlitePool,
    shutdown: Shutdown,
}

impl LeadPipelineApp {
    pub async fn initialize(config: AppConfig, paths: ResolvedPaths, shutdown: Shutdown) -> Result<Self> {
        let lock = if config.skip_process_guard {
            tracing::warn!(
                target: "lifecycle",
                "process guard skipped because SKIP_PROCESS_GUARD is set"
            );
            None
        } else {
            Some(InstanceGuard::acquire(&paths.lock_path, DEFAULT_MAX_WAIT)?)
        };

        let request = ScrapeRequest::from_config(&config.scrape);
        request.validate()?;

        tracing::info!(
            target: "lifecycle",
            data_dir = %paths.data_dir.display(),
            "opening lead store"
        );
        let pool = db::init_pool(&paths.db_path).await?;
        let message_repo = MessageLogRepository::new(pool.clone());
        let listing_repo = ListingLogRepository::new(pool.clone());
        let message_log: Arc<dyn MessageLog> = Arc::new(message_repo.clone());
        let limits = Arc::new(
            LimitsStore::load(SettingsRepository::new(pool.clone()), config.dispatch.initial_limits)
                .await?,
        );

        let tables = match &config.heuristics_file {
            Some(path) => HeuristicTables::load(path)?,
            None => HeuristicTables::default(),
        };
        tracing::info!(
            target: "classify",
            version = tables.version,
            keywords = tables.company_keywords.len(),
            "heuristic tables loaded"
        );

        let timezone: Tz = config.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(
                target: "lifecycle",
                timezone = %config.timezone,
                "unknown timezone; falling back to America/Chicago"
            );
            chrono_tz::America::Chicago
        });

        let http_client = Client::builder()
            .user_agent(format!("frbo-lead-pipeline/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let template = config
            .dispatch
            .message_template
            .clone()
            .map(MessageTemplate::new)
            .unwrap_or_default();
        let action = build_action(&config, http_client.clone());
        let scheduler = DispatchScheduler::new(
            limits.current(),
            action,
            Box::new(RandomPacing::new(config.dispatch.pacing.clone())),
            Arc::new(TokioClock),
            template.clone(),
        );
        let (processor, dispatcher) =
            DispatchProcessor::new(scheduler, limits.subscribe(), Some(message_log.clone()));
        let processor_handle = processor.spawn(shutdown.subscribe());

        let guard = DuplicateGuard::new(Some(message_log.clone()), config.duplicate_window_days);
        tracing::info!(
            target: "guard",
            window_days = guard.default_window_days(),
            "duplicate guard ready"
        );
        let mut intake = LeadIntake::new(
            guard,
            Some(message_log),
            dispatcher.clone(),
            template,
        )
        .with_listing_log(listing_repo.clone());
        if let Some(endpoint) = &config.export.webhook_url {
            intake = intake.with_exporter(SheetExporter::new(
                http_client.clone(),
                endpoint.clone(),
                timezone,
                config.export.timeout,
            ));
        }

        let renderer = Arc::new(HttpRenderer::new(
            http_client,
            config.scrape.render.user_agent.clone(),
        ));
        let extractor = PageSignalExtractor::new(renderer, config.scrape.render.clone());
        let pipeline = ScrapePipeline::new(
            extractor,
            Arc::new(tables),
            config.scrape.search_base_url.clone(),
        );

        let runner = Arc::new(ScrapeRunner {
            pipeline,
            intake,
            request,
            busy: Mutex::new(()),
        });

        let scheduler = if config.scrape.cron_specs.is_empty() {
            None
        } else {
            let callback: ScrapeCallback = {
                let runner = runner.clone();
                Arc::new(move || {
                    let runner = runner.clone();
                    async move { runner.run().await }.boxed()
                })
            };
            Some(configure_scrape_jobs(&config.scrape.cron_specs, callback).await?)
        };

        let console = ConsoleController::new(dispatcher, limits, message_repo, listing_repo);

        Ok(Self {
            _lock: lock,
            _paths: paths,
            scheduler,
            processor_handle,
            console,
            runner,
            pool,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let LeadPipelineApp {
            _lock,
            _paths: _,
            scheduler,
            mut processor_handle,
            console,
            runner,
            pool,
            shutdown,
        } = self;

        tracing::info!(target: "lifecycle", "lead pipeline started");

        if std::io::stdin().is_terminal() {
            tokio::spawn(console.run(shutdown.subscribe()));
        } else {
            tracing::info!(target: "lifecycle", "stdin is not a terminal; console disabled");
        }

        if scheduler.is_none() {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run().await });
        }

        let mut shutdown_listener = shutdown.subscribe();
        shutdown_listener.notified().await;
        tracing::info!(target: "lifecycle", "shutdown signal received (CTRL+C / SIGTERM)");
        shutdown.trigger();

        if let Some(mut scheduler) = scheduler {
            match timeout(SHUTDOWN_TIMEOUT, scheduler.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(target: "scheduler", ?err, "scheduler shutdown failed"),
                Err(_) => tracing::warn!(
                    target: "scheduler",
                    "scheduler did not stop within {:?}",
                    SHUTDOWN_TIMEOUT
                ),
            }
        }

        let processor_sleep = tokio::time::sleep(SHUTDOWN_TIMEOUT);
        tokio::pin!(processor_sleep);
        tokio::select! {
            res = &mut processor_handle => {
                if let Err(err) = res {
                    if err.is_panic() {
                        tracing::error!(target: "dispatch", "dispatch processor panicked");
                    }
                }
            }
            _ = &mut processor_sleep => {
                tracing::warn!(
                    target: "dispatch",
                    "dispatch processor did not stop within {:?}; aborting",
                    SHUTDOWN_TIMEOUT
                );
                processor_handle.abort();
            }
        }

        if timeout(SHUTDOWN_TIMEOUT, pool.close()).await.is_err() {
            tracing::warn!(target: "db", "database pool did not close within {:?}", SHUTDOWN_TIMEOUT);
        }

        tracing::info!(target: "lifecycle", "lead pipeline stopped");
        Ok(())
    }
}

fn build_action(config: &AppConfig, client: Client) -> Arc<dyn DispatchAction> {
    match (config.dispatch.mode, &config.dispatch.webhook_url) {
        (DispatchMode::Webhook, Some(endpoint)) => Arc::new(WebhookAction::new(
            client,
            endpoint.clone(),
            config.dispatch.webhook_timeout,
        )),
        (DispatchMode::Browser, _) => Arc::new(BrowserOpenAction),
        _ => Arc::new(DryRunAction),
    }
}

struct ScrapeRunner {
    pipeline: ScrapePipeline,
    intake: LeadIntake,
    request: ScrapeRequest,
    busy: Mutex<()>,
}

impl ScrapeRunner {
    async fn run(&self) {
        let Ok(_running) = self.busy.try_lock() else {
            tracing::warn!(target: "scrape", "previous scrape run still in progress; skipping");
            return;
        };

        match self.pipeline.run_batch(&self.request).await {
            Ok(batch) => {
                self.intake
                    .accept(&batch, self.request.city_query.as_deref())
                    .await;
            }
            Err(err) => tracing::error!(target: "scrape", error = %err, "scrape run failed"),
        }
    }
}
