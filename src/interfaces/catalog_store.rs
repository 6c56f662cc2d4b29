use async_trait::async_trait;

use crate::catalog::CatalogRow;
use crate::error::Result;

/// Durable upsert target for computed rows. External collaborator boundary:
/// the in-memory implementation lives in `catalog`; a deployment may swap in
/// a database-backed one. Durability is a side channel — no read-path
/// correctness depends on this trait succeeding.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace the row keyed by (product name, location).
    async fn upsert(&self, row: &CatalogRow) -> Result<()>;

    /// The most recently computed row, if any; used to reseed the cache at
    /// startup.
    async fn latest(&self) -> Result<Option<CatalogRow>>;

    /// All persisted rows; used to rehydrate manual adjustments at startup.
    async fn all(&self) -> Result<Vec<CatalogRow>>;
}
