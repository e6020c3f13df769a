//! Escrow module - hash-locked atomic swaps
//!
//! This module provides:
//! - The swap data model: assets, hash locks, identifiers and on-chain records
//! - The coordinator that runs the approve-then-lock workflow
//! - Read-only lookups of swaps and of the contract itself

pub mod coordinator;
pub mod types;

pub use coordinator::SwapCoordinator;
pub use types::{LockParams, SwapStatus, SwapVariant};
