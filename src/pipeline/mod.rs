pub mod extraction;
pub mod format;
pub mod rate_limit;
pub mod processor;
