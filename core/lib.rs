//! External hash partitioning with spill-to-disk.
//!
//! Records are routed by the hash of an extracted key into a fixed number of
//! [`Partition`]s. Each partition buffers records in memory and spills the buffer to
//! its own backing file as a framed chunk whenever the buffer grows past the block
//! size. Once the write phase is closed, every partition can be replayed: spilled
//! chunks are decoded in the order they were written, followed by whatever never
//! left memory.
//!
//! ```no_run
//! use hashspill_core::{
//!     PartitionedRelation, RelationConfig, Row, RowCodec, TempDirAllocator, Value,
//! };
//!
//! # fn main() -> hashspill_core::Result<()> {
//! let allocator = TempDirAllocator::new()?;
//! let rows = (0..1000).map(|i| Row::new(vec![Value::Integer(i), Value::Integer(i % 7)]));
//! let mut relation = PartitionedRelation::build(
//!     rows,
//!     |row: &Row| row.get(1).cloned(),
//!     RowCodec,
//!     &RelationConfig::default(),
//!     &allocator,
//! )?;
//! for partition in &relation {
//!     for row in partition.get_data()? {
//!         let _row = row?;
//!     }
//! }
//! relation.close_all_partitions()?;
//! # Ok(())
//! # }
//! ```
mod assert;
pub mod codec;
mod error;
pub mod hash;
pub mod io;
pub mod partition;
pub mod relation;
pub mod types;
pub mod varint;

pub use codec::{decode_chunk, encode_chunk, framed_len, RecordCodec, RowCodec};
pub use error::SpillError;
pub use hash::{bucket_for_hash, KeyHasher, RapidKeyHasher};
pub use io::{SpillFile, SpillFileAllocator, TempDirAllocator};
pub use partition::{
    OverflowPolicy, Partition, PartitionConfig, PartitionReplay, PartitionState, PartitionStats,
    DEFAULT_BLOCK_SIZE,
};
pub use relation::{PartitionedRelation, RelationConfig, RelationStats, DEFAULT_PARTITION_COUNT};
pub use types::{Row, Value, ValueRef};

pub type Result<T, E = SpillError> = std::result::Result<T, E>;
