// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The read source: an iterator of [`Read`] records, trimmed and filtered
//! before the core ever sees them. The aligner only consumes `sequence`,
//! `qualities` and `mapq`; the remaining fields exist so the pipeline layer
//! can do overlap trimming and per-sample bookkeeping upstream of it.

use rust_htslib::bam;
use rust_htslib::bam::record::Cigar;
use rust_htslib::bam::Read as BamRead;

use crate::errors::Error;
use crate::utils::Region;

/// A single aligned read, decoupled from `rust_htslib`'s borrowed record
/// type so it can be buffered, trimmed and passed to the core by value.
#[derive(Clone, Debug)]
pub struct Read {
    pub sample: String,
    pub sequence: Vec<u8>,
    pub qualities: Vec<u8>,
    pub cigar: Vec<Cigar>,
    pub start: i64,
    pub flags: u16,
    pub mapq: u8,
    pub insert_size: i64,
    pub mate_start: i64,
    pub mate_contig: Option<String>,
}

impl Read {
    pub fn is_proper_pair(&self) -> bool {
        self.flags & 0x2 != 0
    }

    pub fn is_reverse(&self) -> bool {
        self.flags & 0x10 != 0
    }

    pub fn is_secondary(&self) -> bool {
        self.flags & 0x100 != 0
    }

    /// Damp (zero out) the quality of bases past `insert_size`, as a
    /// short-insert read's tail can run past its mate and into adapter.
    pub fn dampen_tail_past_insert_size(&mut self) {
        if self.insert_size <= 0 {
            return;
        }
        let keep = self.insert_size as usize;
        for q in self.qualities.iter_mut().skip(keep) {
            *q = 0;
        }
    }
}

/// Reads spanning `region`, optionally trimmed of mate-pair overlap and
/// tail quality damping. Implementations may filter secondary/duplicate
/// reads before yielding them.
pub trait ReadSource {
    type Iter: Iterator<Item = Read>;

    fn fetch(&mut self, region: &Region) -> Result<Self::Iter, Error>;
}

/// A `ReadSource` backed by one indexed BAM/CRAM file, yielding every
/// primary alignment overlapping the requested region for a single sample.
pub struct IndexedBamSource {
    reader: bam::IndexedReader,
    sample: String,
    use_secondary: bool,
}

impl IndexedBamSource {
    pub fn open(path: impl AsRef<std::path::Path>, sample: impl Into<String>, use_secondary: bool) -> Result<Self, Error> {
        let reader = bam::IndexedReader::from_path(&path).map_err(|_| Error::MissingFastaIndex {
            path: path.as_ref().to_path_buf(),
        })?;
        Ok(IndexedBamSource {
            reader,
            sample: sample.into(),
            use_secondary,
        })
    }
}

impl ReadSource for IndexedBamSource {
    type Iter = std::vec::IntoIter<Read>;

    fn fetch(&mut self, region: &Region) -> Result<Self::Iter, Error> {
        let tid = self
            .reader
            .header()
            .tid(region.contig().as_bytes())
            .ok_or_else(|| Error::UnknownContig {
                contig: region.contig().to_string(),
            })?;
        self.reader
            .fetch(tid, region.start() as u64, region.end() as u64)
            .map_err(|_| Error::UnknownContig {
                contig: region.contig().to_string(),
            })?;

        let mut out = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result.map_err(|_| Error::UnknownContig {
                contig: region.contig().to_string(),
            })?;
            if record.is_secondary() && !self.use_secondary {
                continue;
            }
            if record.is_unmapped() || record.is_duplicate() {
                continue;
            }
            let mate_contig = if record.tid() == record.mtid() {
                None
            } else if record.mtid() >= 0 {
                Some(String::from_utf8_lossy(self.reader.header().tid2name(record.mtid() as u32)).into_owned())
            } else {
                None
            };
            out.push(Read {
                sample: self.sample.clone(),
                sequence: record.seq().as_bytes(),
                qualities: record.qual().to_vec(),
                cigar: record.cigar().iter().cloned().collect(),
                start: record.pos(),
                flags: record.flags(),
                mapq: record.mapq(),
                insert_size: record.insert_size(),
                mate_start: record.mpos(),
                mate_contig,
            });
        }
        Ok(out.into_iter())
    }
}
