pub mod dispatch;
pub mod listing;
pub mod types;

pub use dispatch::{
    DispatchItem, DispatchLimits, LimitsUpdate, MessageLogEntry, MessageStatus, DEFAULT_CAP_DAY,
    DEFAULT_CAP_HOUR,
};
pub use listing::{BatchResult, BatchSummary, Listing, SignalBundle};
pub use types::{ClassificationResult, CompanySignals, NameChoice, QueueSnapshot};
