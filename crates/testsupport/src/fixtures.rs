//! Common test fixtures for the disk/buffer/catalog stack.
//!
//! Every fixture here builds a small, fast-to-allocate disk geometry —
//! tests that need a specific geometry (e.g. to provoke `BufferFull` or
//! `DiskFull`) should build their own `Config` instead.

use buffer::BufferPool;
use catalog::{Catalog, ColumnMetadata, ColumnType};
use common::Config;
use storage::Disk;
use tempfile::TempDir;

/// A small disk geometry sized for fast tests, not realism.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let config = small_config();
/// assert_eq!(config.sectors_per_block(), 2);
/// ```
pub fn small_config() -> Config {
    Config::builder()
        .num_platters(2)
        .num_surfaces_per_platter(1)
        .num_cylinders(2)
        .num_sectors_per_track(8)
        .block_size(256)
        .sector_size(128)
        .buffer_pool_size(8)
        .build()
}

/// Create a fresh on-disk database under a new temp directory and wrap it
/// in a buffer pool. The `TempDir` must be kept alive for as long as the
/// pool is used.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let (_dir, _pool) = fresh_pool("T");
/// ```
pub fn fresh_pool(name: &str) -> (TempDir, BufferPool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = small_config();
    let disk = Disk::create(dir.path(), name, &config).expect("create disk");
    let pool = BufferPool::new(disk, &config);
    (dir, pool)
}

/// Reopen a database previously created by [`fresh_pool`] at `dir`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let (dir, pool) = fresh_pool("T");
/// drop(pool);
/// let _reopened = reopen_pool(&dir, "T");
/// ```
pub fn reopen_pool(dir: &TempDir, name: &str) -> BufferPool {
    let config = small_config();
    let disk = Disk::open(dir.path(), name, &config).expect("open disk");
    BufferPool::new(disk, &config)
}

/// Bootstrap (or load) a catalog on top of a fresh pool.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let (_dir, catalog) = fresh_catalog("T");
/// assert!(catalog.list_tables().is_empty());
/// ```
pub fn fresh_catalog(name: &str) -> (TempDir, Catalog) {
    let (dir, pool) = fresh_pool(name);
    let catalog = Catalog::init(pool).expect("init catalog");
    (dir, catalog)
}

pub fn int_column(name: &str) -> ColumnMetadata {
    ColumnMetadata {
        name: name.to_string(),
        ty: ColumnType::Int,
        size: 4,
    }
}

pub fn varchar_column(name: &str, size: u32) -> ColumnMetadata {
    ColumnMetadata {
        name: name.to_string(),
        ty: ColumnType::Varchar,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pool_starts_empty() {
        let (_dir, mut pool) = fresh_pool("fixture");
        assert_eq!(pool.buffered_page_count(), 0);
    }

    #[test]
    fn fresh_catalog_starts_with_no_tables() {
        let (_dir, catalog) = fresh_catalog("fixture");
        assert!(catalog.list_tables().is_empty());
    }
}
