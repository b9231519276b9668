//! Core library for OSync – object storage synchronisation engine.
//!
//! Brings a target (bucket prefix or local tree) into structural equality
//! with a source: missing objects are transferred, diverged objects are
//! overwritten, and optionally objects existing only at the target are
//! deleted. Divergence is decided from size and modification time alone.

mod diff;
mod error;
mod filter;
mod inventory;
mod memory;
mod monitor;
mod object;
mod relocate;
mod store;
mod sync;
mod transfer;
mod utils;

pub use diff::{diff, DiffOptions, InventoryDiff};
pub use error::{Result, SyncError};
pub use filter::{KeyFilter, Pattern};
pub use inventory::{list_bucket_objects, list_local_objects};
pub use memory::MemoryStore;
pub use monitor::{SyncMonitor, TransferEvent, TransferSnapshot, TransferStatus};
pub use object::{BucketPath, Inventory, ObjectLocation, SyncObject};
pub use relocate::{relocate, Relocation};
pub use store::{CopyRequest, ListPage, ObjectBody, ObjectRecord, ObjectStore, PutRequest};
pub use sync::{SyncClient, SyncOptions, SyncReport};
pub use transfer::{CommandInput, DeleteTarget, InputValue, TransferCommand, TransferManager};
