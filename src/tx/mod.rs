//! Transaction construction, submission and confirmation tracking

mod builder;
mod gas;
mod tracker;

pub use builder::{CallOptions, TransactionBuilder};
pub use gas::GasEstimator;
pub use tracker::{ConfirmationTracker, Finality, TrackerConfig};

#[cfg(test)]
pub use builder::UnsignedTx;
