//! Funds Transfer
//!
//! Moves an exact decimal amount between two accounts as one atomic unit of
//! work and keeps an auditable record of every attempt.
//!
//! # Record lifecycle
//!
//! ```text
//! PENDING ──► COMPLETED   committed together with both balance writes
//!    │
//!    └──────► FAILED      business rejection, or abandoned by the sweeper
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Record-Before-Mutate**: the PENDING record exists before any hold is taken
//! 2. **Canonical Hold Order**: lower account id is always held first
//! 3. **Single Outcome**: every status change is a CAS from PENDING
//! 4. **Conservation**: a committed transfer never changes the sum of balances

pub mod engine;
pub mod events;
pub mod records;
pub mod state;
pub mod sweeper;
pub mod types;

pub use engine::{EngineConfig, TransferEngine, lock_order};
pub use events::{TracingEvents, TransferEvents};
pub use records::TransactionRecordStore;
pub use state::TransactionStatus;
pub use sweeper::{StaleTransferSweeper, SweeperConfig};
pub use types::{TransactionId, TransactionRecord, TransferRequest, ValidatedTransfer};
