// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Reference sequence access. The core only ever sees a [`ReferenceWindow`];
//! how those bytes were fetched -- an indexed FASTA file, a test fixture, a
//! cache -- is an implementation detail behind [`ReferenceSource`].

use std::fs::File;
use std::path::{Path, PathBuf};

use bio::io::fasta;

use crate::errors::Error;
use crate::utils::{BasePairSequence, Region, ReferenceWindow};

/// Fetches the bases covering an arbitrary contig/interval. Implementations
/// must return a window whose sequence length equals `region.interval().size()`
/// exactly, honoring the half-open convention.
pub trait ReferenceSource {
    fn fetch(&mut self, region: &Region) -> Result<ReferenceWindow, Error>;

    fn contig_length(&self, contig: &str) -> Result<i64, Error>;
}

/// A `.fai`-indexed FASTA file, read through [`bio::io::fasta::IndexedReader`].
pub struct IndexedFastaReference {
    reader: fasta::IndexedReader<File>,
    path: PathBuf,
}

impl IndexedFastaReference {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let reader = fasta::IndexedReader::from_file(&path).map_err(|_| Error::MissingFastaIndex {
            path: path.clone(),
        })?;
        Ok(IndexedFastaReference { reader, path })
    }
}

impl ReferenceSource for IndexedFastaReference {
    fn fetch(&mut self, region: &Region) -> Result<ReferenceWindow, Error> {
        self.reader
            .fetch(region.contig(), region.start() as u64, region.end() as u64)
            .map_err(|_| Error::UnknownContig {
                contig: region.contig().to_string(),
            })?;
        let mut bases = Vec::with_capacity(region.interval().size() as usize);
        self.reader.read(&mut bases).map_err(|_| Error::UnknownContig {
            contig: region.contig().to_string(),
        })?;
        for base in bases.iter_mut() {
            *base = base.to_ascii_uppercase();
        }
        Ok(ReferenceWindow::new(region.clone(), BasePairSequence::new(bases)))
    }

    fn contig_length(&self, contig: &str) -> Result<i64, Error> {
        self.reader
            .index
            .sequences()
            .into_iter()
            .find(|seq| seq.name == contig)
            .map(|seq| seq.len as i64)
            .ok_or_else(|| Error::UnknownContig {
                contig: contig.to_string(),
            })
    }
}

impl IndexedFastaReference {
    /// Every contig named in the `.fai` index, in index order, paired with
    /// its length -- the fallback region set when a caller gives none.
    pub fn all_contigs(&self) -> Vec<(String, i64)> {
        self.reader
            .index
            .sequences()
            .into_iter()
            .map(|seq| (seq.name, seq.len as i64))
            .collect()
    }
}

impl std::fmt::Debug for IndexedFastaReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IndexedFastaReference({})", self.path.display())
    }
}
