// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Glue between the mapper, the aligner and a read's mapping quality,
//! producing a single per-(read, haplotype) probability. Carries
//! probabilities as [`bio::stats::LogProb`]/[`bio::stats::Prob`] rather than
//! raw `f64`, matching how the rest of the evidence layer handles them.

use bio::stats::{LogProb, PHREDProb, Prob};

use crate::alignment::align;
use crate::mapping::KmerIndex;
use crate::utils::Interval;

/// How far to either side of a mapper candidate's start the aligner window
/// extends, so that `left + right + read.len() == haplotype.len()` holds
/// the aligner's fixed band-width invariant (`haplotype.len() == read.len() + 15`).
const ALIGNER_LEFT_FLANK: i64 = 7;
const ALIGNER_RIGHT_FLANK: i64 = 8;

/// A fallback probability assigned to a read under the hypothesis that its
/// mapping position is simply wrong, too small to compete with any honest
/// alignment but large enough to keep the mixture non-degenerate.
const WRONG_MAPPING_FLOOR: f64 = 1e-19;

/// Slice the aligner's fixed-width window for a mapper candidate out of a
/// (padded) haplotype sequence. Returns `None` if the candidate sits too
/// close to either edge for the window to fit; the mapper's own `allowed`
/// range already reserves this padding, so this only guards a
/// caller-supplied hint that ignored it.
fn aligner_window(haplotype_len: usize, candidate: i64, read_len: i64) -> Option<(usize, usize)> {
    let start = candidate - ALIGNER_LEFT_FLANK;
    let end = candidate + read_len + ALIGNER_RIGHT_FLANK;
    if start < 0 || end > haplotype_len as i64 {
        return None;
    }
    Some((start as usize, end as usize))
}

/// The probability that `read` arose from `haplotype`, combining the best
/// alignment score over the mapper's candidate starts with the read's
/// reported mapping quality: `p_align · (1 - m) + m · 1e-19`, where `m =
/// 10^(-mapq/10)` is the probability the read is simply mapped to the wrong
/// place altogether.
pub fn read_likelihood(
    index: &KmerIndex,
    haplotype: &[u8],
    read: &[u8],
    qualities: &[u8],
    mapq: u8,
    gap_open: &[i32],
    gap_extend: i32,
    nuc_prior: i32,
    hint: Option<i64>,
    allowed: Interval,
) -> Prob {
    let candidates = index.map_read(read, hint, allowed);
    if candidates.is_empty() {
        return Prob(0.0);
    }

    let best_score = candidates
        .into_iter()
        .filter_map(|candidate| {
            let (start, end) = aligner_window(haplotype.len(), candidate, read.len() as i64)?;
            let window = &haplotype[start..end];
            let window_gap_open = &gap_open[start..end];
            Some(align(window, read, qualities, window_gap_open, gap_extend, nuc_prior, false).phred_score)
        })
        .min();

    let best_score = match best_score {
        Some(q) => q,
        None => return Prob(0.0),
    };

    let p_align = Prob::from(PHREDProb(best_score as f64));
    let m = Prob::from(PHREDProb(mapq as f64));
    Prob(*p_align * (1.0 - *m) + *m * WRONG_MAPPING_FLOOR)
}

/// Convert a read's mapping quality into the log-probability that it is
/// mapped correctly.
pub fn prob_correctly_mapped(mapq: u8) -> LogProb {
    LogProb::from(PHREDProb(mapq as f64)).ln_one_minus_exp()
}
