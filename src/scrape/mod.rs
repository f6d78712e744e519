pub mod extractor;
pub mod intake;
pub mod pipeline;
pub mod renderer;

pub use extractor::PageSignalExtractor;
pub use intake::LeadIntake;
pub use pipeline::{ScrapePipeline, ScrapeRequest};
pub use renderer::HttpRenderer;
