//! Serialized-candidate container format and combiner
//!
//! A container is one header record - a JSON object carrying a
//! configuration snapshot, the block index and the total candidate count -
//! terminated by a newline, followed immediately by the raw binary payload
//! region. Candidate blocks are opaque byte ranges addressed by
//! `(contig, block key)` through the index; nothing in this module parses
//! or transcodes block payloads.
//!
//! Workers emit *partial* files holding only raw payload bytes; the local
//! index and byte length travel in the task result. [`Combiner`] merges the
//! partials into one container in a single streaming, append-only pass.

use crate::error::{ContainerError, ContainerResult, Result, ScatterError};
use chrono::Utc;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Container format version; combine-mode input sets must agree on it
pub const FORMAT_VERSION: u32 = 2;

/// Coordinate span covered by one candidate block key
pub const DEFAULT_BLOCK_SIZE: u64 = 100_000;

/// One addressable byte range inside the payload region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    /// Byte offset relative to the start of the payload region
    pub offset: u64,

    /// Length of the block in bytes
    pub length: u64,
}

/// Block index: contig -> block key -> spans
///
/// Append-only per key; several parts may contribute spans to the same
/// `(contig, key)` pair.
pub type BlockIndex = BTreeMap<String, BTreeMap<String, Vec<BlockSpan>>>;

/// Configuration snapshot echoed into every container header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMeta {
    /// Container format version
    pub format_version: u32,

    /// Coordinate span per block key
    pub block_size: u64,

    /// Declared sample id
    pub sample_id: String,

    /// Contig lengths in reference order
    pub contig_lengths: Vec<(String, u64)>,

    /// Creation timestamp (RFC 3339)
    pub created: String,
}

impl ContainerMeta {
    /// Snapshot for a new container
    pub fn new(sample_id: String, contig_lengths: Vec<(String, u64)>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            block_size: DEFAULT_BLOCK_SIZE,
            sample_id,
            contig_lengths,
            created: Utc::now().to_rfc3339(),
        }
    }
}

/// The header record of a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub meta: ContainerMeta,
    pub index: BlockIndex,
    pub candidate_count: u64,
}

/// One worker-produced partial container, pending combination
///
/// The file at `path` holds raw payload bytes only; index and length are
/// carried here. Consumed (and the file deleted) by [`Combiner::run`].
#[derive(Debug, Clone)]
pub struct ContainerPart {
    /// Creation id of the task that produced this part
    pub task_id: usize,

    /// Worker-local partial file (payload bytes only)
    pub path: PathBuf,

    /// Byte offset of the payload region inside the file; 0 for worker
    /// partials, the header length when a finished container is re-merged
    pub payload_offset: u64,

    /// Index local to this part (offsets relative to the part's payload)
    pub index: BlockIndex,

    /// Total payload bytes in this part
    pub byte_len: u64,

    /// Candidates serialized into this part
    pub candidate_count: u64,
}

impl ContainerPart {
    /// Treat a finished container as one mergeable part
    ///
    /// Used by the `merge` utility to consolidate sharded containers of
    /// the same sample; the container's own index is already relative to
    /// its payload region.
    pub fn from_container(path: &Path, task_id: usize) -> ContainerResult<Self> {
        let container = CandidateContainer::open(path)?;
        Ok(Self {
            task_id,
            path: path.to_path_buf(),
            payload_offset: container.payload_start,
            index: container.header.index.clone(),
            byte_len: container.payload_len,
            candidate_count: container.header.candidate_count,
        })
    }
}

/// Writer for a worker-local partial file
///
/// Appends opaque blocks and tracks the local index; `finish` yields the
/// [`ContainerPart`] handed back to the scheduler in the task result.
pub struct PartWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    index: BlockIndex,
    offset: u64,
    candidate_count: u64,
}

impl PartWriter {
    /// Create a partial file at `path`
    pub fn create(path: &Path) -> ContainerResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            index: BlockIndex::new(),
            offset: 0,
            candidate_count: 0,
        })
    }

    /// Append one opaque block and record it in the local index
    pub fn append_block(
        &mut self,
        contig: &str,
        key: &str,
        bytes: &[u8],
        candidates: u64,
    ) -> ContainerResult<()> {
        self.writer.write_all(bytes)?;
        self.index
            .entry(contig.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(BlockSpan {
                offset: self.offset,
                length: bytes.len() as u64,
            });
        self.offset += bytes.len() as u64;
        self.candidate_count += candidates;
        Ok(())
    }

    /// Flush and close, yielding the part descriptor for `task_id`
    pub fn finish(mut self, task_id: usize) -> ContainerResult<ContainerPart> {
        self.writer.flush()?;
        Ok(ContainerPart {
            task_id,
            path: self.path,
            payload_offset: 0,
            index: self.index,
            byte_len: self.offset,
            candidate_count: self.candidate_count,
        })
    }
}

/// Read access to a finished container: header plus byte-addressed blocks
pub struct CandidateContainer {
    path: PathBuf,
    header: ContainerHeader,
    file: File,
    payload_start: u64,
    payload_len: u64,
}

impl CandidateContainer {
    /// Open a container, parse its header record and locate the payload
    pub fn open(path: &Path) -> ContainerResult<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut header_line = String::new();
        let n = reader.read_line(&mut header_line)?;
        if n == 0 || !header_line.ends_with('\n') {
            return Err(ContainerError::HeaderMissing {
                path: path.to_path_buf(),
            });
        }

        let header: ContainerHeader =
            serde_json::from_str(header_line.trim_end()).map_err(|e| {
                ContainerError::HeaderParse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;

        if header.meta.format_version != FORMAT_VERSION {
            return Err(ContainerError::VersionMismatch {
                path: path.to_path_buf(),
                found: header.meta.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let payload_start = header_line.len() as u64;
        let file = reader.into_inner();
        let payload_len = file.metadata()?.len().saturating_sub(payload_start);

        Ok(Self {
            path: path.to_path_buf(),
            header,
            file,
            payload_start,
            payload_len,
        })
    }

    /// The parsed header record
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Container file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total payload bytes
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Spans recorded for `(contig, key)`, if any
    pub fn spans(&self, contig: &str, key: &str) -> Option<&[BlockSpan]> {
        self.header
            .index
            .get(contig)
            .and_then(|keys| keys.get(key))
            .map(Vec::as_slice)
    }

    /// Read one block's exact original bytes from the payload region
    pub fn read_block(
        &mut self,
        contig: &str,
        key: &str,
        span: BlockSpan,
    ) -> ContainerResult<Vec<u8>> {
        if span.offset + span.length > self.payload_len {
            return Err(ContainerError::BlockOutOfRange {
                contig: contig.to_string(),
                key: key.to_string(),
                offset: span.offset,
                length: span.length,
                payload_len: self.payload_len,
            });
        }

        self.file
            .seek(SeekFrom::Start(self.payload_start + span.offset))?;
        let mut buf = vec![0u8; span.length as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Union the contig-length lists of several container headers
///
/// First-seen order is preserved. A contig reported with different lengths
/// across the set resolves to the maximum, with a warning; the planned
/// partition must cover every input's coordinates.
pub fn union_contig_lengths(metas: &[ContainerMeta]) -> Vec<(String, u64)> {
    let mut union: Vec<(String, u64)> = Vec::new();
    for meta in metas {
        for (name, length) in &meta.contig_lengths {
            match union.iter_mut().find(|(n, _)| n == name) {
                None => union.push((name.clone(), *length)),
                Some((_, existing)) => {
                    if *existing != *length {
                        warn!(
                            contig = %name,
                            a = *existing,
                            b = *length,
                            "Contig length disagrees across containers; using the larger"
                        );
                        *existing = (*existing).max(*length);
                    }
                }
            }
        }
    }
    union
}

/// Result of a completed combine pass
#[derive(Debug)]
pub struct CombineStats {
    /// Parts consumed
    pub parts: usize,

    /// Block spans recorded in the combined index
    pub blocks: u64,

    /// Total candidates across all parts
    pub candidates: u64,

    /// Payload bytes written
    pub bytes: u64,

    /// Time taken for the merge
    pub duration: Duration,
}

/// Merges worker-produced partial files into one container
///
/// Single-pass and append-only: the combined index is assembled from the
/// parts' in-memory indexes with a running byte offset, then each part's
/// raw payload is streamed verbatim into the output and the partial file
/// deleted. No block payload is parsed or transcoded.
pub struct Combiner {
    meta: ContainerMeta,
    out_path: PathBuf,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
    delete_consumed: bool,
}

impl Combiner {
    /// Create a combiner writing to `out_path`
    pub fn new(meta: ContainerMeta, out_path: &Path) -> Self {
        Self {
            meta,
            out_path: out_path.to_path_buf(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
            delete_consumed: true,
        }
    }

    /// Attach a byte-based progress bar
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Leave source files in place after merging (for the `merge` utility;
    /// worker partials are always transient and deleted)
    pub fn keep_sources(mut self) -> Self {
        self.delete_consumed = false;
        self
    }

    /// Get a clone of the cancel flag (for signal handlers)
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the merge; on any failure the partially written output is removed
    pub fn run(&self, parts: Vec<ContainerPart>) -> Result<CombineStats> {
        match self.run_inner(parts) {
            Ok(stats) => Ok(stats),
            Err(e) => {
                let _ = fs::remove_file(&self.out_path);
                Err(e)
            }
        }
    }

    fn run_inner(&self, mut parts: Vec<ContainerPart>) -> Result<CombineStats> {
        let start = Instant::now();

        // Merge order is task creation order, not completion order
        parts.sort_by_key(|part| part.task_id);

        let mut index = BlockIndex::new();
        let mut offset = 0u64;
        let mut candidate_count = 0u64;
        let mut blocks = 0u64;

        for part in &parts {
            for (contig, keys) in &part.index {
                let contig_index = index.entry(contig.clone()).or_default();
                for (key, spans) in keys {
                    let merged = contig_index.entry(key.clone()).or_default();
                    for span in spans {
                        merged.push(BlockSpan {
                            offset: span.offset + offset,
                            length: span.length,
                        });
                        blocks += 1;
                    }
                }
            }
            offset += part.byte_len;
            candidate_count += part.candidate_count;
        }

        let header = ContainerHeader {
            meta: self.meta.clone(),
            index,
            candidate_count,
        };

        let mut writer = BufWriter::new(File::create(&self.out_path)?);
        let header_json = serde_json::to_string(&header).map_err(|e| {
            ScatterError::Container(ContainerError::HeaderParse {
                path: self.out_path.clone(),
                reason: e.to_string(),
            })
        })?;
        writer.write_all(header_json.as_bytes())?;
        writer.write_all(b"\n")?;

        let mut bytes_written = 0u64;
        for part in &parts {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(ScatterError::Interrupted);
            }

            let actual = fs::metadata(&part.path)
                .map_err(ContainerError::from)?
                .len()
                .saturating_sub(part.payload_offset);
            if actual != part.byte_len {
                return Err(ScatterError::Container(ContainerError::PartSizeMismatch {
                    path: part.path.clone(),
                    expected: part.byte_len,
                    actual,
                }));
            }

            let mut part_file = File::open(&part.path).map_err(ContainerError::from)?;
            if part.payload_offset > 0 {
                part_file.seek(SeekFrom::Start(part.payload_offset))?;
            }
            let copied = io::copy(&mut part_file, &mut writer)?;
            bytes_written += copied;

            // Partial files are transient; delete each once consumed
            if self.delete_consumed {
                fs::remove_file(&part.path).map_err(ContainerError::from)?;
            }
            debug!(task = part.task_id, bytes = copied, "Part merged");

            if let Some(bar) = &self.progress {
                bar.inc(copied);
            }
        }

        writer.flush()?;

        let stats = CombineStats {
            parts: parts.len(),
            blocks,
            candidates: candidate_count,
            bytes: bytes_written,
            duration: start.elapsed(),
        };

        info!(
            parts = stats.parts,
            blocks = stats.blocks,
            candidates = stats.candidates,
            bytes = stats.bytes,
            "Containers combined"
        );

        Ok(stats)
    }
}
