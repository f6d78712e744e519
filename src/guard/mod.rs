pub mod duplicate;

pub use duplicate::DuplicateGuard;
