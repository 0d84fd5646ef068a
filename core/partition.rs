//! A single hash partition: an in-memory buffer that spills framed chunks to its
//! own backing file, followed by a read-only replay phase.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::assert::{assert_send, spill_assert};
use crate::codec::{decode_chunk, encode_chunk, framed_len, RecordCodec};
use crate::error::SpillError;
use crate::io::SpillFile;
use crate::Result;

/// Default spill threshold, in framed bytes held in memory per partition.
pub const DEFAULT_BLOCK_SIZE: usize = 64_000;

/// What happens to the record whose insert triggers a spill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// The record starts the next buffer. No record is lost.
    #[default]
    Retain,
    /// The record is dropped and counted in [`PartitionStats::records_discarded`].
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Once the buffered records frame to more than this many bytes, the next
    /// insert spills the buffer.
    pub block_size: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    /// Accepting inserts.
    Writing,
    /// Write phase finished, replays allowed.
    InputClosed,
    /// A write to the backing file failed. Its content is unknown, so only
    /// `close_partition` is allowed.
    Failed,
    /// Backing file deleted, nothing allowed.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub records_received: u64,
    pub records_discarded: u64,
    pub spill_count: u64,
    pub bytes_spilled: u64,
}

/// One hash bucket of a partitioned relation.
///
/// The content of a partition is the records of every spilled chunk, in the order the
/// chunks were written, followed by the in-memory tail. The backing file has no
/// delimiters between chunks, so their boundaries live in `chunk_sizes`.
pub struct Partition<C: RecordCodec> {
    idx: usize,
    config: PartitionConfig,
    codec: C,
    file: SpillFile,
    /// Present only in the write phase.
    writer: Option<BufWriter<File>>,
    buffer: Vec<C::Record>,
    /// Exact framed length of `buffer`.
    buffered_bytes: usize,
    chunk_sizes: Vec<usize>,
    spilled: bool,
    state: PartitionState,
    stats: PartitionStats,
    spill_buf: Vec<u8>,
}

assert_send!(Partition<crate::codec::RowCodec>);

impl<C: RecordCodec> std::fmt::Debug for Partition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("idx", &self.idx)
            .field("path", &self.file.path())
            .field("state", &self.state)
            .field("buffered_records", &self.buffer.len())
            .field("buffered_bytes", &self.buffered_bytes)
            .field("chunk_sizes", &self.chunk_sizes)
            .finish()
    }
}

impl<C: RecordCodec> Partition<C> {
    /// Creates an empty partition over `file` and opens its write handle.
    pub fn new(idx: usize, config: PartitionConfig, codec: C, file: SpillFile) -> Result<Self> {
        let writer = file.open_writer()?;
        Ok(Self {
            idx,
            config,
            codec,
            file,
            writer: Some(writer),
            buffer: Vec::new(),
            buffered_bytes: 0,
            chunk_sizes: Vec::new(),
            spilled: false,
            state: PartitionState::Writing,
            stats: PartitionStats::default(),
            spill_buf: Vec::new(),
        })
    }

    /// Adds a record. If the buffer already frames to more than the block size, it is
    /// spilled first and the record is handled according to the overflow policy.
    pub fn insert(&mut self, record: C::Record) -> Result<()> {
        if self.state != PartitionState::Writing {
            return Err(SpillError::InvalidState(format!(
                "partition {}: insert in state {:?}",
                self.idx, self.state
            )));
        }
        self.stats.records_received += 1;

        if self.buffered_bytes > self.config.block_size {
            self.spill()?;
            if self.config.overflow_policy == OverflowPolicy::Discard {
                self.stats.records_discarded += 1;
                tracing::warn!(
                    "partition {}: discarding record that triggered spill #{}",
                    self.idx,
                    self.stats.spill_count
                );
                return Ok(());
            }
        }

        self.buffered_bytes += framed_len(&self.codec, &record);
        self.buffer.push(record);
        Ok(())
    }

    /// Appends the whole buffer to the backing file as one chunk.
    fn spill(&mut self) -> Result<()> {
        spill_assert!(
            !self.buffer.is_empty(),
            "partition {}: spill of an empty buffer",
            self.idx
        );
        let Some(writer) = self.writer.as_mut() else {
            return Err(SpillError::InternalError(format!(
                "partition {}: spill without a write handle",
                self.idx
            )));
        };

        self.spill_buf.clear();
        encode_chunk(&self.codec, &self.buffer, &mut self.spill_buf);
        spill_assert!(
            self.spill_buf.len() == self.buffered_bytes,
            "partition {}: chunk is {} bytes but buffer accounted for {}",
            self.idx,
            self.spill_buf.len(),
            self.buffered_bytes
        );
        if let Err(e) = writer.write_all(&self.spill_buf) {
            return Err(self.fail(e));
        }

        let chunk_size = self.spill_buf.len();
        tracing::debug!(
            "partition {}: spilled chunk {} ({} records, {} bytes)",
            self.idx,
            self.chunk_sizes.len(),
            self.buffer.len(),
            chunk_size
        );
        self.chunk_sizes.push(chunk_size);
        self.spilled = true;
        self.stats.spill_count += 1;
        self.stats.bytes_spilled += chunk_size as u64;
        self.buffer.clear();
        self.buffered_bytes = 0;
        Ok(())
    }

    /// Ends the write phase. A partition that has spilled writes its remaining buffer
    /// as a final chunk; one that never spilled keeps everything in memory.
    pub fn close_input(&mut self) -> Result<()> {
        if self.state != PartitionState::Writing {
            return Err(SpillError::InvalidState(format!(
                "partition {}: close_input in state {:?}",
                self.idx, self.state
            )));
        }
        if self.spilled && !self.buffer.is_empty() {
            self.spill()?;
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                return Err(self.fail(e));
            }
        }
        self.writer = None;
        self.spill_buf = Vec::new();
        self.state = PartitionState::InputClosed;
        Ok(())
    }

    /// Moves to `Failed` after a write error and drops the write handle.
    fn fail(&mut self, e: std::io::Error) -> SpillError {
        tracing::error!(
            "partition {}: write to {} failed: {e}",
            self.idx,
            self.file.path().display()
        );
        self.state = PartitionState::Failed;
        self.writer = None;
        self.spill_buf = Vec::new();
        SpillError::IOError(e)
    }

    /// Starts a replay of the partition's content. Every call starts from the
    /// beginning of the backing file.
    pub fn get_data(&self) -> Result<PartitionReplay<'_, C>> {
        match self.state {
            PartitionState::InputClosed => {}
            PartitionState::Writing => {
                return Err(SpillError::InvalidState(format!(
                    "partition {}: replay before close_input",
                    self.idx
                )));
            }
            PartitionState::Closed => {
                return Err(SpillError::InvalidState(format!(
                    "partition {}: replay after close_partition",
                    self.idx
                )));
            }
            PartitionState::Failed => {
                return Err(SpillError::InvalidState(format!(
                    "partition {}: replay after a failed write",
                    self.idx
                )));
            }
        }
        let reader = if self.chunk_sizes.is_empty() {
            None
        } else {
            Some(self.file.open_reader()?)
        };
        Ok(PartitionReplay {
            partition: self,
            reader,
            state: ReplayState::ReadingChunk {
                next_chunk: 0,
                records: Vec::new().into_iter(),
            },
            read_buf: Vec::new(),
        })
    }

    /// Deletes the backing file and drops the in-memory tail. Closing twice is a no-op.
    pub fn close_partition(&mut self) -> Result<()> {
        if self.state == PartitionState::Closed {
            return Ok(());
        }
        self.writer = None;
        self.file.remove()?;
        self.buffer = Vec::new();
        self.buffered_bytes = 0;
        self.state = PartitionState::Closed;
        Ok(())
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn chunk_sizes(&self) -> &[usize] {
        &self.chunk_sizes
    }

    pub fn is_spilled(&self) -> bool {
        self.spilled
    }

    pub fn is_input_closed(&self) -> bool {
        matches!(
            self.state,
            PartitionState::InputClosed | PartitionState::Closed
        )
    }

    pub fn state(&self) -> PartitionState {
        self.state
    }

    /// Number of records currently held in memory.
    pub fn buffered_records(&self) -> usize {
        self.buffer.len()
    }

    /// Framed byte length of the records held in memory.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stats(&self) -> PartitionStats {
        self.stats
    }
}

impl<C: RecordCodec> Drop for Partition<C> {
    fn drop(&mut self) {
        if self.state == PartitionState::Closed {
            return;
        }
        self.writer = None;
        if let Err(e) = self.file.remove() {
            tracing::warn!(
                "partition {}: failed to remove {}: {e}",
                self.idx,
                self.file.path().display()
            );
        }
    }
}

enum ReplayState<'a, R> {
    /// Draining the decoded records of the chunk before `next_chunk`.
    ReadingChunk {
        next_chunk: usize,
        records: std::vec::IntoIter<R>,
    },
    ReadingTail(std::slice::Iter<'a, R>),
    Exhausted,
}

/// Forward-only iterator over a partition's records: spilled chunks first, then the
/// in-memory tail. Decoding fails fast; after the first error the replay yields
/// nothing more.
pub struct PartitionReplay<'a, C: RecordCodec> {
    partition: &'a Partition<C>,
    reader: Option<BufReader<File>>,
    state: ReplayState<'a, C::Record>,
    read_buf: Vec<u8>,
}

impl<C: RecordCodec> PartitionReplay<'_, C> {
    fn read_chunk(&mut self, chunk_idx: usize) -> Result<Vec<C::Record>> {
        let partition = self.partition;
        let chunk_size = partition.chunk_sizes[chunk_idx];
        if chunk_size == 0 {
            return Err(SpillError::Corrupt(format!(
                "partition {}: chunk {chunk_idx} has zero size",
                partition.idx
            )));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(SpillError::InternalError(format!(
                "partition {}: replay has no read handle",
                partition.idx
            )));
        };

        self.read_buf.resize(chunk_size, 0);
        reader.read_exact(&mut self.read_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SpillError::Corrupt(format!(
                    "partition {}: chunk {chunk_idx} truncated, expected {chunk_size} bytes",
                    partition.idx
                ))
            } else {
                SpillError::IOError(e)
            }
        })?;
        tracing::trace!(
            "partition {}: read chunk {chunk_idx} ({chunk_size} bytes)",
            partition.idx
        );
        decode_chunk(&partition.codec, &self.read_buf)
    }
}

impl<C> Iterator for PartitionReplay<'_, C>
where
    C: RecordCodec,
    C::Record: Clone,
{
    type Item = Result<C::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                ReplayState::ReadingChunk {
                    next_chunk,
                    records,
                } => {
                    if let Some(record) = records.next() {
                        return Some(Ok(record));
                    }
                    let chunk_idx = *next_chunk;
                    if chunk_idx == self.partition.chunk_sizes.len() {
                        self.reader = None;
                        let partition = self.partition;
                        self.state = ReplayState::ReadingTail(partition.buffer.iter());
                        continue;
                    }
                    match self.read_chunk(chunk_idx) {
                        Ok(records) => {
                            self.state = ReplayState::ReadingChunk {
                                next_chunk: chunk_idx + 1,
                                records: records.into_iter(),
                            };
                        }
                        Err(e) => {
                            self.reader = None;
                            self.state = ReplayState::Exhausted;
                            return Some(Err(e));
                        }
                    }
                }
                ReplayState::ReadingTail(tail) => match tail.next() {
                    Some(record) => return Some(Ok(record.clone())),
                    None => self.state = ReplayState::Exhausted,
                },
                ReplayState::Exhausted => return None,
            }
        }
    }
}
