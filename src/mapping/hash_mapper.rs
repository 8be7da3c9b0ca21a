// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A rolling-hash k-mer index over a haplotype window, used to propose
//! candidate start offsets for a read before the aligner is invoked.

use std::collections::HashMap;

use crate::utils::Interval;

/// A chain that has grown past [`MAX_REPEAT_COUNT`] entries: common
/// k-mers stop being indexed so that a single repeat doesn't flood the
/// candidate list with chain walks.
const REPEAT_CHAIN: i64 = -2;
const END_OF_CHAIN: i64 = -1;
const MAX_REPEAT_COUNT: usize = 10;

/// Map a base to a 2-bit code by masking the two low-order bits that
/// distinguish A, C, G and T in ASCII. `N` (or any other byte) maps to
/// whichever of the four codes its masked bits happen to produce; callers
/// must not rely on k-mers spanning `N` being meaningful.
fn base_code(base: u8) -> u32 {
    ((base & 0x6) >> 1) as u32
}

fn kmer_hash(bases: &[u8]) -> u32 {
    let mut h = 0u32;
    for (j, &b) in bases.iter().enumerate() {
        h |= base_code(b) << (2 * j);
    }
    h
}

/// An index of every k-mer's start position in a reference sequence,
/// bucketed by hash with explicit collision chains (no parent pointers, no
/// dynamic hash-map buckets: a flat table plus a same-sized "next" array).
pub struct KmerIndex {
    k: usize,
    hash_table: Vec<i64>,
    collisions: Vec<i64>,
}

impl KmerIndex {
    /// Build an index over every k-mer of `sequence`. `k` must be small
    /// enough that `4^k` fits comfortably in memory (`k <= 14` covers every
    /// realistic use).
    pub fn new(k: usize, sequence: &[u8]) -> Self {
        assert!(k > 0 && k <= 14, "bug: k-mer size out of supported range");
        let table_size = 1usize << (2 * k);
        let mut hash_table = vec![END_OF_CHAIN; table_size];
        let mut collisions = vec![END_OF_CHAIN; sequence.len().max(1)];

        if sequence.len() >= k {
            let mut h = kmer_hash(&sequence[0..k]);
            Self::insert(&mut hash_table, &mut collisions, h as usize, 0);
            for idx in k..sequence.len() {
                h = (h >> 2) | (base_code(sequence[idx]) << (2 * (k - 1)));
                let pos = (idx - k + 1) as i64;
                Self::insert(&mut hash_table, &mut collisions, h as usize, pos);
            }
        }

        KmerIndex {
            k,
            hash_table,
            collisions,
        }
    }

    fn insert(hash_table: &mut [i64], collisions: &mut [i64], h: usize, pos: i64) {
        match hash_table[h] {
            REPEAT_CHAIN => {}
            END_OF_CHAIN => hash_table[h] = pos,
            first => {
                let mut count = 1usize;
                let mut cur = first;
                while collisions[cur as usize] != END_OF_CHAIN {
                    cur = collisions[cur as usize];
                    count += 1;
                }
                if count >= MAX_REPEAT_COUNT {
                    hash_table[h] = REPEAT_CHAIN;
                } else {
                    collisions[cur as usize] = pos;
                }
            }
        }
    }

    fn chain(&self, h: usize) -> Option<Vec<i64>> {
        match self.hash_table[h] {
            REPEAT_CHAIN => None,
            END_OF_CHAIN => Some(Vec::new()),
            first => {
                let mut positions = vec![first];
                let mut cur = first;
                while self.collisions[cur as usize] != END_OF_CHAIN {
                    cur = self.collisions[cur as usize];
                    positions.push(cur);
                }
                Some(positions)
            }
        }
    }

    /// Propose candidate start offsets (positions in the indexed sequence
    /// where `read` might begin) by voting: every shared k-mer between
    /// `read` and the index casts a vote for the haplotype offset implied
    /// by aligning that k-mer's occurrences.
    ///
    /// Kept candidates must (a) individually reach at least a fifth of the
    /// best candidate's vote count and (b) jointly account for at least
    /// `1 - 1/MAX_REPEAT_COUNT` of the total votes cast. If no candidate
    /// clears both bars, falls back to `hint` (clamped into `allowed` if
    /// necessary), or returns nothing if there is no hint.
    pub fn map_read(&self, read: &[u8], hint: Option<i64>, allowed: Interval) -> Vec<i64> {
        let k = self.k;
        if read.len() < k {
            return hint.into_iter().map(|h| clamp(h, allowed)).collect();
        }

        let mut votes: HashMap<i64, u32> = HashMap::new();
        let mut h = kmer_hash(&read[0..k]);
        self.cast_votes(h as usize, 0, allowed, &mut votes);
        for read_idx in k..read.len() {
            h = (h >> 2) | (base_code(read[read_idx]) << (2 * (k - 1)));
            let kmer_start = read_idx - k + 1;
            self.cast_votes(h as usize, kmer_start as i64, allowed, &mut votes);
        }

        if votes.is_empty() {
            return hint.into_iter().map(|h| clamp(h, allowed)).collect();
        }

        let total: u32 = votes.values().sum();
        let max_count = *votes.values().max().unwrap();
        let individual_floor = max_count as f64 / 5.0;

        let mut kept: Vec<(i64, u32)> = votes
            .into_iter()
            .filter(|&(_, count)| count as f64 >= individual_floor)
            .collect();
        kept.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let kept_total: u32 = kept.iter().map(|&(_, c)| c).sum();
        let coverage_fraction = 1.0 - 1.0 / MAX_REPEAT_COUNT as f64;

        if (kept_total as f64) < coverage_fraction * total as f64 {
            return hint.into_iter().map(|h| clamp(h, allowed)).collect();
        }

        let mut positions: Vec<i64> = kept.into_iter().map(|(pos, _)| pos).collect();
        positions.sort_unstable();
        positions
    }

    fn cast_votes(&self, h: usize, read_kmer_start: i64, allowed: Interval, votes: &mut HashMap<i64, u32>) {
        if let Some(positions) = self.chain(h) {
            for hap_pos in positions {
                let candidate = hap_pos - read_kmer_start;
                if allowed.contains_point(candidate) {
                    *votes.entry(candidate).or_insert(0) += 1;
                }
            }
        }
    }
}

fn clamp(value: i64, allowed: Interval) -> i64 {
    value.max(allowed.start()).min(allowed.end() - 1)
}

/// The range of haplotype offsets a read of `read_len` could start at,
/// given a haplotype of `hap_len` and a required `padding` flank on either
/// side (so the aligner's fixed-width window always has room).
pub fn alignable_range(hap_len: i64, read_len: i64, padding: i64) -> Interval {
    Interval::new(padding, hap_len - read_len - padding + 1)
}
