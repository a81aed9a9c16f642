//! Input collaborator types
//!
//! The alignment-container and annotation parsers live outside this crate;
//! the scheduler consumes them through the narrow surface defined here:
//! contig names, lengths and mapped-unit counts, interval annotations, the
//! target-call set for genotyping, and the combine-mode sample manifest.

use crate::error::ConfigError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One reference sequence as reported by the alignment input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigInfo {
    /// Contig name (chromosome/scaffold)
    pub name: String,

    /// Contig length in bases
    pub length: u64,

    /// Mapped units (reads/candidates) on this contig; drives task splitting
    pub mapped_units: u64,
}

/// Contract the alignment-container collaborator must satisfy
///
/// The concrete reader (BAM/CRAM header + index statistics) lives with the
/// detection engine; the scheduler only needs the contig enumeration and
/// the global mapped-unit total.
pub trait AlignmentInput {
    /// Contigs in reference order
    fn contigs(&self) -> &[ContigInfo];

    /// Global mapped-unit total; 0 is the "unknown" sentinel for formats
    /// that do not report totals
    fn total_mapped_units(&self) -> u64;
}

/// Contig table backed by a TSV file (`name<TAB>length[<TAB>units]`)
///
/// The simplest realization of [`AlignmentInput`], used by the `plan`
/// subcommand and by pipelines that precompute index statistics.
#[derive(Debug, Clone, Default)]
pub struct ContigTable {
    contigs: Vec<ContigInfo>,
    total_units: u64,
}

impl ContigTable {
    /// Build a table from already-parsed contig records
    pub fn new(contigs: Vec<ContigInfo>) -> Self {
        let total_units = contigs.iter().map(|c| c.mapped_units).sum();
        Self {
            contigs,
            total_units,
        }
    }

    /// Load a contig table from a TSV file
    ///
    /// Blank lines and `#` comment lines are skipped. The units column is
    /// optional; a table without it reports a zero (unknown) total.
    pub fn from_tsv(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|e| ConfigError::UnreadableInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut contigs = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ConfigError::UnreadableInput {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default();
            if name.is_empty() {
                return Err(ConfigError::ContigTableParse {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    reason: "missing contig name".into(),
                });
            }

            let length = parse_u64_field(fields.next(), "length").map_err(|reason| {
                ConfigError::ContigTableParse {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    reason,
                }
            })?;

            let mapped_units = match fields.next() {
                Some(units) => {
                    parse_u64_field(Some(units), "units").map_err(|reason| {
                        ConfigError::ContigTableParse {
                            path: path.to_path_buf(),
                            line: lineno + 1,
                            reason,
                        }
                    })?
                }
                None => 0,
            };

            contigs.push(ContigInfo {
                name: name.to_string(),
                length,
                mapped_units,
            });
        }

        Ok(Self::new(contigs))
    }
}

impl AlignmentInput for ContigTable {
    fn contigs(&self) -> &[ContigInfo] {
        &self.contigs
    }

    fn total_mapped_units(&self) -> u64 {
        self.total_units
    }
}

fn parse_u64_field(field: Option<&str>, what: &str) -> Result<u64, String> {
    match field {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid {} '{}'", what, raw)),
        None => Err(format!("missing {} column", what)),
    }
}

/// An interval annotation passed through to the worker (e.g. a tandem-repeat
/// region); the payload is opaque to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionAnnotation {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub payload: String,
}

/// Load BED-like interval annotations (`contig<TAB>start<TAB>end[<TAB>rest]`)
///
/// Everything past the third column is kept verbatim as the opaque payload.
pub fn load_annotations(path: &Path) -> Result<Vec<RegionAnnotation>, ConfigError> {
    let file = File::open(path).map_err(|e| ConfigError::UnreadableInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut annotations = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ConfigError::UnreadableInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.splitn(4, '\t').collect();
        if fields.len() < 3 {
            return Err(ConfigError::ContigTableParse {
                path: path.to_path_buf(),
                line: lineno + 1,
                reason: "expected at least contig, start and end columns".into(),
            });
        }

        let start = parse_u64_field(Some(fields[1]), "start").map_err(|reason| {
            ConfigError::ContigTableParse {
                path: path.to_path_buf(),
                line: lineno + 1,
                reason,
            }
        })?;
        let end = parse_u64_field(Some(fields[2]), "end").map_err(|reason| {
            ConfigError::ContigTableParse {
                path: path.to_path_buf(),
                line: lineno + 1,
                reason,
            }
        })?;

        annotations.push(RegionAnnotation {
            contig: fields[0].to_string(),
            start,
            end,
            payload: fields.get(3).unwrap_or(&"").to_string(),
        });
    }

    Ok(annotations)
}

/// One externally supplied call to be genotyped, keyed by its input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    /// 0-based index among the input's record lines
    pub line_index: usize,

    /// Contig the call is placed on
    pub contig: String,

    /// Position of the call
    pub pos: u64,

    /// The raw input line, re-emitted unchanged when no result arrives
    pub raw: String,
}

/// The full genotyping input: header lines plus position-keyed records
///
/// Only the leading two columns (contig, position) are interpreted; the
/// record encoding itself stays opaque and is carried as the raw line.
#[derive(Debug, Clone, Default)]
pub struct TargetCallSet {
    /// Leading `#` lines, re-emitted verbatim ahead of the records
    pub header_lines: Vec<String>,

    /// Records in input order
    pub records: Vec<TargetRecord>,
}

impl TargetCallSet {
    /// Parse a target-call set from a reader of VCF-shaped lines
    pub fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self, ConfigError> {
        let mut set = TargetCallSet::default();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ConfigError::UnreadableInput {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            if line.starts_with('#') {
                set.header_lines.push(line);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let mut fields = line.splitn(3, '\t');
            let contig = fields.next().unwrap_or_default().to_string();
            let pos = parse_u64_field(fields.next(), "position").map_err(|reason| {
                ConfigError::ContigTableParse {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    reason,
                }
            })?;

            set.records.push(TargetRecord {
                line_index: set.records.len(),
                contig,
                pos,
                raw: line,
            });
        }
        Ok(set)
    }

    /// Load a target-call set from a file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|e| ConfigError::UnreadableInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_reader(BufReader::new(file), path)
    }
}

/// One combine-mode input container with its optional sample label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub sample_label: Option<String>,
}

/// Parse a combine-mode sample manifest (`path[<TAB>sample-label]` per line)
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ConfigError> {
    let file = File::open(path).map_err(|e| ConfigError::UnreadableInput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ConfigError::UnreadableInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(2, '\t');
        let container = fields.next().unwrap_or_default();
        if container.is_empty() {
            return Err(ConfigError::ManifestParse {
                path: path.to_path_buf(),
                line: lineno + 1,
                reason: "missing container path".into(),
            });
        }
        let sample_label = fields
            .next()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(String::from);

        entries.push(ManifestEntry {
            path: PathBuf::from(container),
            sample_label,
        });
    }

    if entries.is_empty() {
        return Err(ConfigError::ManifestParse {
            path: path.to_path_buf(),
            line: 0,
            reason: "manifest lists no containers".into(),
        });
    }

    Ok(entries)
}
