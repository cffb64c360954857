#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Logical identifier for a page (block), assigned monotonically by the disk.
/// Id 0 is reserved for the disk-metadata page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalPageId(pub u32);

impl LogicalPageId {
    pub const METADATA: LogicalPageId = LogicalPageId(0);

    pub fn is_metadata(self) -> bool {
        self == Self::METADATA
    }
}

/// A physical sector address: `(platter, surface, cylinder, sector)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalAddress {
    pub platter: u32,
    pub surface: u32,
    pub cylinder: u32,
    pub sector: u32,
}

impl PhysicalAddress {
    pub fn new(platter: u32, surface: u32, cylinder: u32, sector: u32) -> Self {
        Self {
            platter,
            surface,
            cylinder,
            sector,
        }
    }
}

/// Hint passed to allocation so the disk can steer a page into its
/// preferred sector range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageType {
    Catalog,
    Data,
    Index,
}

/// Allocation status of one logical block, tracked by the disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Empty,
    Incomplete,
    Full,
}

impl BlockStatus {
    pub fn to_bits(self) -> u8 {
        match self {
            BlockStatus::Empty => 0,
            BlockStatus::Incomplete => 1,
            BlockStatus::Full => 2,
        }
    }

    pub fn from_bits(bits: u8) -> DbResult<Self> {
        match bits {
            0 => Ok(BlockStatus::Empty),
            1 => Ok(BlockStatus::Incomplete),
            2 => Ok(BlockStatus::Full),
            other => Err(DbError::InvalidParameter(format!(
                "block status bit pattern {other} out of range"
            ))),
        }
    }
}

/// Which unpinned frame the buffer pool's replacement policy should give up next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicyKind {
    Lru,
    Clock,
}

/// Canonical error type shared across the disk, buffer pool, record manager
/// and catalog. Every public operation in this crate family returns a
/// `DbResult`; there is no separate status-code/out-parameter pair.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("disk full")]
    DiskFull,
    #[error("buffer full")]
    BufferFull,
    #[error("page {0:?} is pinned")]
    PagePinned(LogicalPageId),
    #[error("invalid block id {0:?}")]
    InvalidBlockId(LogicalPageId),
    #[error("invalid page type")]
    InvalidPageType,
    #[error("out of memory")]
    OutOfMemory,
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),
    #[error("{0}")]
    Other(String),
}

/// Result alias carrying a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for a simulated disk plus the buffer pool sitting
/// on top of it. Fixed at disk-creation time.
///
/// # Example
/// ```
/// use common::{Config, ReplacementPolicyKind};
///
/// let config = Config::builder()
///     .num_platters(2)
///     .num_surfaces_per_platter(1)
///     .num_cylinders(4)
///     .num_sectors_per_track(16)
///     .block_size(512)
///     .sector_size(256)
///     .buffer_pool_size(32)
///     .replacement_policy(ReplacementPolicyKind::Lru)
///     .build();
/// assert_eq!(config.sectors_per_block(), 2);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    #[builder(default = 2)]
    pub num_platters: u32,
    #[builder(default = 2)]
    pub num_surfaces_per_platter: u32,
    #[builder(default = 64)]
    pub num_cylinders: u32,
    #[builder(default = 32)]
    pub num_sectors_per_track: u32,
    #[builder(default = 4096)]
    pub block_size: u32,
    #[builder(default = 512)]
    pub sector_size: u32,
    #[builder(default = 256)]
    pub buffer_pool_size: usize,
    #[builder(default = ReplacementPolicyKind::Lru)]
    pub replacement_policy: ReplacementPolicyKind,
}

impl Config {
    /// Sectors spanned by one logical block. Validated by `validate()`.
    pub fn sectors_per_block(&self) -> u32 {
        self.block_size / self.sector_size
    }

    /// Rejects a configuration whose geometry or sizing is internally
    /// inconsistent (odd platter count, block size not a multiple of
    /// sector size, a track too short to fit one block, ...).
    pub fn validate(&self) -> DbResult<()> {
        if self.num_platters == 0 || self.num_platters % 2 != 0 {
            return Err(DbError::InvalidParameter(
                "num_platters must be even and >= 2".into(),
            ));
        }
        if self.num_surfaces_per_platter == 0 {
            return Err(DbError::InvalidParameter(
                "num_surfaces_per_platter must be >= 1".into(),
            ));
        }
        if self.num_cylinders == 0 {
            return Err(DbError::InvalidParameter(
                "num_cylinders must be >= 1".into(),
            ));
        }
        if self.block_size == 0 || self.sector_size == 0 || self.block_size % self.sector_size != 0
        {
            return Err(DbError::InvalidParameter(
                "block_size must be a positive multiple of sector_size".into(),
            ));
        }
        if self.num_sectors_per_track < self.sectors_per_block() {
            return Err(DbError::InvalidParameter(
                "num_sectors_per_track must be at least sectors_per_block".into(),
            ));
        }
        if self.buffer_pool_size == 0 {
            return Err(DbError::InvalidParameter(
                "buffer_pool_size must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_platters: 2,
            num_surfaces_per_platter: 2,
            num_cylinders: 64,
            num_sectors_per_track: 32,
            block_size: 4096,
            sector_size: 512,
            buffer_pool_size: 256,
            replacement_policy: ReplacementPolicyKind::Lru,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        BlockStatus, Config, DbError, DbResult, LogicalPageId, PageType, PhysicalAddress,
        ReplacementPolicyKind,
    };
}
