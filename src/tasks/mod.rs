pub mod actions;
pub mod cron;
pub mod pacing;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod template;
pub mod window;
