pub mod aggregation;
pub mod filters;
pub mod grouping;
pub mod ledger;
pub mod metrics;
pub mod numeric;
pub mod performance;
pub mod records;
pub mod recurring;
pub mod selection;
pub mod timeline;
