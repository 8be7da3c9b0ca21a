// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Block splitting and the map/reduce worker pool. Workers share no
//! in-memory state: each one writes a private VCF shard, named so that
//! sorting shard filenames lexicographically reproduces contig order then
//! ascending position, and a final reduce step concatenates them.

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::errors::Error;
use crate::utils::{Interval, Region};

/// Split `region` into contiguous blocks of at most `max_block_size`. The
/// last block absorbs any remainder shorter than `max_block_size`.
pub fn split_into_blocks(region: &Region, max_block_size: i64) -> Vec<Region> {
    assert!(max_block_size > 0, "bug: max_block_size must be positive");
    let mut blocks = Vec::new();
    let mut pos = region.start();
    while pos < region.end() {
        let end = (pos + max_block_size).min(region.end());
        blocks.push(Region::new(region.contig(), Interval::new(pos, end)));
        pos = end;
    }
    blocks
}

/// Process every block through `process_block`, one private VCF shard per
/// block, across a `rayon` pool sized to `num_jobs` (0 runs on the calling
/// thread with no pool at all -- `num_jobs` workers otherwise). Returns the
/// shard paths in block order; block order already matches contig/position
/// order because `split_into_blocks` walks the region left to right.
pub fn run_blocks<F>(blocks: &[Region], num_jobs: usize, process_block: F) -> Result<Vec<PathBuf>, Error>
where
    F: Fn(&Region, usize) -> Result<PathBuf, Error> + Sync,
{
    if num_jobs <= 1 {
        return blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| process_block(block, idx))
            .collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_jobs)
        .build()
        .expect("bug: failed to build the worker pool");

    pool.install(|| {
        blocks
            .par_iter()
            .enumerate()
            .map(|(idx, block)| process_block(block, idx))
            .collect()
    })
}

/// A shard filename that sorts, as plain text, into block order: zero-padded
/// so lexicographic and numeric order agree regardless of block count.
pub fn shard_filename(block_index: usize, total_blocks: usize) -> String {
    let width = total_blocks.to_string().len().max(1);
    format!("shard_{:0width$}.vcf", block_index, width = width)
}

/// Concatenate shard files into one output: the first shard's header is
/// kept, every other shard's header lines (`#`-prefixed) are dropped. Shards
/// must already be in the desired output order.
pub fn reduce_shards(shard_paths: &[PathBuf], output: Option<&Path>) -> Result<(), Error> {
    if shard_paths.is_empty() {
        return Err(Error::MissingShardDirectory);
    }

    let write_target: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|_| Error::StaleShards {
            path: path.to_path_buf(),
        })?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let mut out = write_target;

    for (shard_idx, path) in shard_paths.iter().enumerate() {
        let file = File::open(path).map_err(|_| Error::MissingShardDirectory)?;
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|_| Error::MissingShardDirectory)?;
            if shard_idx > 0 && line.starts_with('#') {
                continue;
            }
            writeln!(out, "{}", line).map_err(|_| Error::MissingShardDirectory)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_tile_the_region_without_gaps_or_overlap() {
        let region = Region::new("chr1", Interval::new(0, 250));
        let blocks = split_into_blocks(&region, 100);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].interval(), Interval::new(0, 100));
        assert_eq!(blocks[1].interval(), Interval::new(100, 200));
        assert_eq!(blocks[2].interval(), Interval::new(200, 250));
    }

    #[test]
    fn a_region_shorter_than_one_block_yields_a_single_block() {
        let region = Region::new("chr1", Interval::new(10, 20));
        let blocks = split_into_blocks(&region, 1000);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].interval(), Interval::new(10, 20));
    }

    #[test]
    fn shard_filenames_sort_in_block_order() {
        let names: Vec<String> = (0..12).map(|i| shard_filename(i, 12)).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn reduce_keeps_only_the_first_shards_header() {
        let dir = tempfile::tempdir().unwrap();
        let shard0 = dir.path().join("shard_0.vcf");
        let shard1 = dir.path().join("shard_1.vcf");
        std::fs::write(&shard0, "#header\nchr1\t1\n").unwrap();
        std::fs::write(&shard1, "#header\nchr1\t2\n").unwrap();

        let out_path = dir.path().join("out.vcf");
        reduce_shards(&[shard0, shard1], Some(&out_path)).unwrap();

        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents, "#header\nchr1\t1\nchr1\t2\n");
    }
}
