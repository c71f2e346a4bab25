//! # tabula-store
//!
//! Partitioned table store interfaces for [`tabula-migrate`](https://docs.rs/tabula-migrate).
//!
//! Rows ([`Entity`]) are grouped into named tables and addressed by a
//! `(partition_key, row_key)` pair. Writes are submitted as atomic batches
//! of at most [`MAX_BATCH_SIZE`] actions that all target one partition.
//! Reads are point lookups or lazy paged scans ([`EntityPager`]).
//!
//! ## Quick Start
//!
//! ```
//! use tabula_store::{ActionKind, BatchAction, Entity, MemoryStore, TableStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryStore::new();
//! store.ensure_table("orders").await.unwrap();
//!
//! let order = Entity::new("eu", "o-1").with("status", "open");
//! store
//!     .submit_batch("orders", "eu", &[BatchAction::new(ActionKind::Add, order)])
//!     .await
//!     .unwrap();
//!
//! let mut pager = store.query_all("orders", 100);
//! let page = pager.next_page().await.unwrap().unwrap();
//! assert_eq!(page.len(), 1);
//! # }
//! ```
//!
//! ## Backends
//!
//! | Backend | Feature flag | Use case |
//! |---------|-------------|----------|
//! | [`MemoryStore`] | *(always available)* | Testing, prototyping |
//! | `SqliteStore` | `sqlite` | Local durable store, CLI |

mod entity;
mod error;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use entity::{Entity, Value};
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{JournalMode, SqliteConfig, SqliteStore};
pub use traits::{
    ActionKind, BatchAction, ContinuationToken, EntityPage, EntityPager, HistoryStore, TableStore,
    MAX_BATCH_SIZE,
};
