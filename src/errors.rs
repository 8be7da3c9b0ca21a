// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;

use thiserror::Error;

/// Input-validation errors: the tier that is fatal at worker start and
/// surfaced to the CLI boundary as `anyhow::Error`. Programming invariants
/// (e.g. a reference window whose region does not contain a sub-region) are
/// not represented here; they are hard `assert!`/`panic!`s, since callers
/// never catch them.
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("reference {path} has no .fai index; run `samtools faidx` first")]
    MissingFastaIndex { path: PathBuf },
    #[error("contig {contig} not found in the reference")]
    UnknownContig { contig: String },
    #[error("region {spec} could not be parsed; expected CONTIG:START-END")]
    InvalidRegionSpec { spec: String },
    #[error("--ploidy must be a positive integer, got {value}")]
    InvalidPloidy { value: i64 },
    #[error("unrecognized soft filter id {id}")]
    UnknownFilterId { id: String },
    #[error("config file {path} is missing required field {field}")]
    MissingConfigField { path: PathBuf, field: String },
    #[error("no input BAMs given")]
    MissingInputBams,
    #[error("reduce mode requires an input directory of VCF shards")]
    MissingShardDirectory,
    #[error("output path {path} already has unmerged shards from a previous run")]
    StaleShards { path: PathBuf },
    #[error("no regions given and the reference has no contigs to fall back to")]
    NoRegionsGiven,
}

/// Tolerable runtime conditions: logged at debug/warning and absorbed by the
/// caller via a sentinel value rather than propagated. Kept here only so call
/// sites can share one vocabulary; these are never wrapped in `anyhow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// A candidate record's reference allele does not match the FASTA at that position.
    ReferenceMismatch,
    /// The normalizer's DP matrix would exceed the size cap.
    OversizedNormalization,
    /// Left-alignment bottomed out against its floor before fully resolving.
    IncompleteLeftAlignment,
}
