pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod mapping;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod scan;
pub mod store;
