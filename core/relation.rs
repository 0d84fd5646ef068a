use std::hash::Hash;

use crate::codec::RecordCodec;
use crate::error::SpillError;
use crate::hash::{bucket_for_hash, KeyHasher, RapidKeyHasher};
use crate::io::SpillFileAllocator;
use crate::partition::{OverflowPolicy, Partition, PartitionConfig, DEFAULT_BLOCK_SIZE};
use crate::Result;

/// Default number of partitions a relation is split into.
pub const DEFAULT_PARTITION_COUNT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationConfig {
    pub partition_count: usize,
    pub block_size: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            block_size: DEFAULT_BLOCK_SIZE,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl RelationConfig {
    /// The configuration every partition of the relation is built with.
    pub fn partition_config(&self) -> PartitionConfig {
        PartitionConfig {
            block_size: self.block_size,
            overflow_policy: self.overflow_policy,
        }
    }
}

/// Totals over every partition of a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationStats {
    pub records_received: u64,
    pub records_discarded: u64,
    pub spill_count: u64,
    pub bytes_spilled: u64,
    pub spilled_partitions: usize,
}

/// A relation split into a fixed number of hash partitions, with the write phase of
/// every partition closed.
#[derive(Debug)]
pub struct PartitionedRelation<C: RecordCodec> {
    partitions: Vec<Partition<C>>,
}

impl<C: RecordCodec> PartitionedRelation<C> {
    /// Partitions `input` by the key `key_fn` extracts, hashed with [`RapidKeyHasher`].
    pub fn build<I, F, K, A>(
        input: I,
        key_fn: F,
        codec: C,
        config: &RelationConfig,
        allocator: &A,
    ) -> Result<Self>
    where
        C: Clone,
        I: IntoIterator<Item = C::Record>,
        F: FnMut(&C::Record) -> K,
        K: Hash,
        A: SpillFileAllocator + ?Sized,
    {
        Self::build_with_hasher(input, key_fn, &RapidKeyHasher, codec, config, allocator)
    }

    /// Like [`PartitionedRelation::build`], hashing keys with `hasher`.
    pub fn build_with_hasher<I, F, K, H, A>(
        input: I,
        mut key_fn: F,
        hasher: &H,
        codec: C,
        config: &RelationConfig,
        allocator: &A,
    ) -> Result<Self>
    where
        C: Clone,
        I: IntoIterator<Item = C::Record>,
        F: FnMut(&C::Record) -> K,
        H: KeyHasher<K> + ?Sized,
        A: SpillFileAllocator + ?Sized,
    {
        if config.partition_count == 0 {
            return Err(SpillError::InvalidArgument(
                "partition_count must be at least 1".to_string(),
            ));
        }

        let partition_config = config.partition_config();
        let mut partitions = Vec::with_capacity(config.partition_count);
        for idx in 0..config.partition_count {
            let file = allocator.allocate(idx)?;
            partitions.push(Partition::new(idx, partition_config, codec.clone(), file)?);
        }

        for record in input {
            let hash = hasher.hash_key(&key_fn(&record));
            let bucket = bucket_for_hash(hash, partitions.len());
            partitions[bucket].insert(record)?;
        }

        for partition in partitions.iter_mut() {
            partition.close_input()?;
        }

        let relation = Self { partitions };
        let stats = relation.stats();
        tracing::debug!(
            "partitioned {} records into {} partitions ({} spilled, {} chunks, {} bytes on disk)",
            stats.records_received,
            relation.len(),
            stats.spilled_partitions,
            stats.spill_count,
            stats.bytes_spilled
        );
        Ok(relation)
    }

    /// Wraps partitions whose write phase is already closed. Partition `i` of the
    /// result is `partitions[i]`.
    pub fn from_partitions(partitions: Vec<Partition<C>>) -> Result<Self> {
        if partitions.is_empty() {
            return Err(SpillError::InvalidArgument(
                "a relation needs at least one partition".to_string(),
            ));
        }
        if let Some(open) = partitions.iter().find(|p| !p.is_input_closed()) {
            return Err(SpillError::InvalidState(format!(
                "partition {} is still accepting input",
                open.idx()
            )));
        }
        Ok(Self { partitions })
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partition(&self, idx: usize) -> Option<&Partition<C>> {
        self.partitions.get(idx)
    }

    pub fn partitions(&self) -> &[Partition<C>] {
        &self.partitions
    }

    /// Partitions in bucket order.
    pub fn iter(&self) -> std::slice::Iter<'_, Partition<C>> {
        self.partitions.iter()
    }

    pub fn stats(&self) -> RelationStats {
        self.partitions
            .iter()
            .fold(RelationStats::default(), |mut total, partition| {
                let stats = partition.stats();
                total.records_received += stats.records_received;
                total.records_discarded += stats.records_discarded;
                total.spill_count += stats.spill_count;
                total.bytes_spilled += stats.bytes_spilled;
                if partition.is_spilled() {
                    total.spilled_partitions += 1;
                }
                total
            })
    }

    /// Closes every partition, including those after one that fails.
    pub fn close_all_partitions(&mut self) -> Result<()> {
        let failures: Vec<(usize, String)> = self
            .partitions
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, partition)| {
                partition
                    .close_partition()
                    .err()
                    .map(|e| (idx, e.to_string()))
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            tracing::error!("failed to close {} partition(s)", failures.len());
            Err(SpillError::CloseFailed(failures))
        }
    }
}

impl<'a, C: RecordCodec> IntoIterator for &'a PartitionedRelation<C> {
    type Item = &'a Partition<C>;
    type IntoIter = std::slice::Iter<'a, Partition<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.iter()
    }
}
