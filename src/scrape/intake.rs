use std::sync::Arc;

use crate::{
    db::{listings::ListingLogRepository, message_log::MessageLog},
    domain::{BatchResult, DispatchItem, Listing, MessageLogEntry, MessageStatus},
    export::SheetExporter,
    guard::DuplicateGuard,
    tasks::{processor::DispatcherHandle, template::MessageTemplate},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub queued: usize,
    pub blocked: usize,
}

pub struct LeadIntake {
    listing_log: Option<ListingLogRepository>,
    exporter: Option<SheetExporter>,
    guard: DuplicateGuard,
    message_log: Option<Arc<dyn MessageLog>>,
    dispatcher: DispatcherHandle,
    template: MessageTemplate,
}

impl LeadIntake {
    pub fn new(
        guard: DuplicateGuard,
        message_log: Option<Arc<dyn MessageLog>>,
        dispatcher: DispatcherHandle,
        template: MessageTemplate,
    ) -> Self {
        Self {
            listing_log: None,
            exporter: None,
            guard,
            message_log,
            dispatcher,
            template,
        }
    }

    pub fn with_listing_log(mut self, repo: ListingLogRepository) -> Self {
        self.listing_log = Some(repo);
        self
    }

    pub fn with_exporter(mut self, exporter: SheetExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub async fn accept(&self, batch: &BatchResult, city: Option<&str>) -> IntakeSummary {
        if let Some(repo) = &self.listing_log {
            if let Err(err) = repo.record_batch(batch).await {
                tracing::warn!(target: "db", error = %err, "failed to record listing log");
            }
        }
        if let Some(exporter) = &self.exporter {
            exporter.export_batch(batch).await;
        }

        let mut summary = IntakeSummary::default();
        let mut items = Vec::with_capacity(batch.included.len());
        for listing in &batch.included {
            let item = dispatch_item(listing, city);
            let check = self.guard.check_duplicate(&listing.id, None).await;
            if check.duplicate {
                summary.blocked += 1;
                self.record_blocked(listing, &item, check.window_days).await;
                continue;
            }
            items.push(item);
        }

        summary.queued = items.len();
        if !items.is_empty() {
            self.dispatcher.add_batch(items);
        }
        tracing::info!(
            target: "dispatch",
            queued = summary.queued,
            blocked = summary.blocked,
            "batch handed to dispatcher"
        );
        summary
    }

    async fn record_blocked(&self, listing: &Listing, item: &DispatchItem, window_days: u32) {
        let Some(log) = &self.message_log else {
            return;
        };
        let mut entry = MessageLogEntry::new(
            &listing.id,
            &listing.url,
            self.template.render(item),
            MessageStatus::BlockedDup,
        )
        .with_reason(format!("contacted within {window_days} days"));
        entry.address = listing.address.clone();
        entry.owner_name = listing.classification.owner_name.clone();

        if let Err(err) = log.append(&entry).await {
            tracing::warn!(target: "guard", listing_id = %listing.id, error = %err, "failed to record duplicate block");
        }
    }
}

pub fn dispatch_item(listing: &Listing, city: Option<&str>) -> DispatchItem {
    let mut item = DispatchItem::new(&listing.url).with_meta("listing_id", &listing.id);
    if let Some(address) = &listing.address {
        item = item.with_meta("address", address);
    }
    if let Some(owner) = &listing.classification.owner_name {
        item = item.with_meta("owner_name", owner);
    }
    if let Some(city) = city {
        item = item.with_meta("city", city);
    }
    if let Some(price) = listing.price {
        item = item.with_meta("price", format_price(price));
    }
    if let Some(beds) = listing.bedrooms {
        item = item.with_meta("beds", format!("{beds} bd"));
    }
    item
}

fn format_price(price: u32) -> String {
    let digits = price.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{message_log::MessageLogRepository, test_pool},
        domain::ClassificationResult,
        tasks::{processor::DispatchCommand, queue::DispatchQueue},
    };

    fn kept(id: &str) -> Listing {
        Listing {
            id: id.into(),
            url: format!("https://www.zillow.com/homedetails/{id}/"),
            address: Some("12 Elm St".into()),
            price: Some(1_995),
            bedrooms: Some(3),
            description: None,
            listed_by_raw: None,
            classification: ClassificationResult {
                owner_name: Some("John Smith".into()),
                owner_confidence: 0.9,
                ..Default::default()
            },
            exclude_reason: None,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn prices_are_grouped() {
        assert_eq!(format_price(950), "$950");
        assert_eq!(format_price(1_995), "$1,995");
        assert_eq!(format_price(1_250_000), "$1,250,000");
    }

    #[test]
    fn item_metadata_feeds_the_template() {
        let item = dispatch_item(&kept("1_zpid"), Some("Austin"));
        assert_eq!(item.meta("listing_id"), Some("1_zpid"));
        assert_eq!(item.meta("price"), Some("$1,995"));
        assert_eq!(item.meta("beds"), Some("3 bd"));
        assert_eq!(item.meta("city"), Some("Austin"));
        assert_eq!(item.meta("baths"), None);
    }

    #[tokio::test]
    async fn recently_contacted_listings_are_blocked_not_queued() {
        let (pool, _dir) = test_pool().await;
        let repo = MessageLogRepository::new(pool.clone());
        let log: Arc<dyn MessageLog> = Arc::new(repo.clone());
        log.append(&MessageLogEntry::new(
            "1_zpid",
            "https://www.zillow.com/homedetails/1_zpid/",
            "hi",
            MessageStatus::Sent,
        ))
        .await
        .unwrap();

        let (handle, mut commands) = DispatcherHandle::detached();
        let intake = LeadIntake::new(
            DuplicateGuard::new(Some(log.clone()), 30),
            Some(log),
            handle,
            MessageTemplate::default(),
        )
        .with_listing_log(ListingLogRepository::new(pool.clone()));

        let batch = BatchResult {
            included: vec![kept("1_zpid"), kept("2_zpid")],
            ..Default::default()
        };
        let summary = intake.accept(&batch, Some("Austin")).await;

        assert_eq!(summary, IntakeSummary { queued: 1, blocked: 1 });
        match commands.try_recv().unwrap() {
            DispatchCommand::AddBatch(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].meta("listing_id"), Some("2_zpid"));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let recent = repo.recent(1).await.unwrap();
        assert_eq!(recent[0].status, MessageStatus::BlockedDup);
        assert_eq!(recent[0].listing_id, "1_zpid");
        assert!(recent[0].message_text.contains("12 Elm St"));
        assert_eq!(
            ListingLogRepository::new(pool).count_by_status("KEPT").await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn back_to_back_runs_queue_a_pending_listing_once() {
        let (handle, mut commands) = DispatcherHandle::detached();
        let intake = LeadIntake::new(
            DuplicateGuard::new(None, 30),
            None,
            handle,
            MessageTemplate::default(),
        );
        let batch = BatchResult {
            included: vec![kept("1_zpid")],
            ..Default::default()
        };

        assert_eq!(intake.accept(&batch, None).await.queued, 1);
        assert_eq!(intake.accept(&batch, None).await.queued, 1);

        let mut queue = DispatchQueue::new();
        while let Ok(command) = commands.try_recv() {
            if let DispatchCommand::AddBatch(items) = command {
                queue.push_batch(items);
            }
        }
        assert_eq!(queue.len(), 1);
        assert!(queue.contains("1_zpid"));
    }
}
