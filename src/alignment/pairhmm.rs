// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The banded global-local pair-HMM aligner: a read is aligned against a
//! haplotype window exactly 15 bases longer than it, with the leading and
//! trailing unused haplotype flanks free (global on the read, local on the
//! haplotype). Scores are Phred-like: lower is better, zero is a perfect
//! match.
//!
//! The table is computed with plain scalar arithmetic over three matrices
//! (match/mismatch, deletion, insertion). Deletion and insertion are kept
//! apart so that a deletion can never transition directly into an
//! insertion: every indel event pays its gap-open penalty exactly once.

use crate::utils::sequence::GAP;

const INF: i32 = i32::MAX / 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Match,
    Delete,
    Insert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeleteSource {
    ExtendDelete,
    OpenFromMatch,
    OpenFromInsert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InsertSource {
    ExtendInsert,
    OpenFromMatch,
}

/// The aligned haplotype/read strings (with `-` marking the other side's
/// gap) plus where in the haplotype window the read's first aligned base
/// landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Traceback {
    pub haplotype_aligned: Vec<u8>,
    pub read_aligned: Vec<u8>,
    pub haplotype_start: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlignmentResult {
    pub phred_score: i32,
    pub traceback: Option<Traceback>,
}

fn base_cost(haplotype_base: u8, read_base: u8, quality: i32, nuc_prior: i32) -> i32 {
    let mismatch_cost = if read_base == haplotype_base {
        0
    } else {
        quality
    };
    if haplotype_base == GAP {
        mismatch_cost.min(nuc_prior)
    } else {
        mismatch_cost
    }
}

/// Align `read` against `haplotype`.
///
/// `haplotype.len()` must equal `read.len() + 15` (the fixed band width);
/// `gap_open` must have one entry per haplotype position (see
/// [`super::gap_model::compute_gap_open`]); `gap_extend` is charged per
/// base beyond the first in a run; `nuc_prior` is charged per inserted base
/// and per base matched against haplotype `N`.
pub fn align(
    haplotype: &[u8],
    read: &[u8],
    qualities: &[u8],
    gap_open: &[i32],
    gap_extend: i32,
    nuc_prior: i32,
    want_traceback: bool,
) -> AlignmentResult {
    let h = haplotype.len();
    let r = read.len();
    assert_eq!(
        h,
        r + 15,
        "bug: haplotype window must be exactly 15 bases longer than the read"
    );
    assert!(h > 8, "bug: haplotype window too short to carry a band");
    assert_eq!(
        gap_open.len(),
        h,
        "bug: gap-open table must have one entry per haplotype position"
    );
    assert_eq!(
        qualities.len(),
        r,
        "bug: quality sequence must have one entry per read base"
    );
    assert!(gap_extend > 0, "bug: gap extend penalty must be positive");
    assert!(nuc_prior >= 0, "bug: nucleotide prior must be non-negative");

    let go = |i: usize| -> i32 { gap_open[i.min(h - 1)] };

    // m[i][j] / d[i][j] / ins[i][j]: best score having consumed i haplotype
    // bases and j read bases, currently in the match/delete/insert state.
    let mut m = vec![vec![0i32; r + 1]; h + 1];
    let mut d = vec![vec![INF; r + 1]; h + 1];
    let mut ins = vec![vec![INF; r + 1]; h + 1];

    let mut m_src = vec![vec![State::Match; r + 1]; h + 1];
    let mut d_src = vec![vec![DeleteSource::ExtendDelete; r + 1]; h + 1];
    let mut ins_src = vec![vec![InsertSource::ExtendInsert; r + 1]; h + 1];

    for j in 1..=r {
        m[0][j] = INF;
    }
    for i in 1..=h {
        // d[i][0]: free to open a deletion anywhere along the unused
        // leading haplotype flank, so the initial gap is not charged, but a
        // deletion "opened" here still costs its own gap_open.
        let extend = d[i - 1][0].saturating_add(gap_extend);
        let open = go(i - 1);
        if open <= extend {
            d[i][0] = open;
            d_src[i][0] = DeleteSource::OpenFromMatch;
        } else {
            d[i][0] = extend;
            d_src[i][0] = DeleteSource::ExtendDelete;
        }
    }

    for i in 1..=h {
        for j in 1..=r {
            // match / mismatch
            let cost = base_cost(haplotype[i - 1], read[j - 1], qualities[j - 1] as i32, nuc_prior);
            let (best_prev, src) = {
                let mut best = m[i - 1][j - 1];
                let mut src = State::Match;
                if d[i - 1][j - 1] < best {
                    best = d[i - 1][j - 1];
                    src = State::Delete;
                }
                if ins[i - 1][j - 1] < best {
                    best = ins[i - 1][j - 1];
                    src = State::Insert;
                }
                (best, src)
            };
            m[i][j] = best_prev.saturating_add(cost);
            m_src[i][j] = src;

            // deletion: consumes a haplotype base, not a read base. D -> I
            // is forbidden, so the "open" branch only looks at M and I.
            let extend = d[i - 1][j].saturating_add(gap_extend);
            let open_from_match = m[i - 1][j];
            let open_from_insert = ins[i - 1][j];
            let (open_cost, open_src) = if open_from_match <= open_from_insert {
                (open_from_match, DeleteSource::OpenFromMatch)
            } else {
                (open_from_insert, DeleteSource::OpenFromInsert)
            };
            let open = open_cost.saturating_add(go(i - 1));
            if extend < open {
                d[i][j] = extend;
                d_src[i][j] = DeleteSource::ExtendDelete;
            } else {
                d[i][j] = open;
                d_src[i][j] = open_src;
            }

            // insertion: consumes a read base, not a haplotype base. The
            // open branch only looks at M, enforcing the D -> I ban.
            let extend = ins[i][j - 1].saturating_add(gap_extend);
            let open = m[i][j - 1].saturating_add(go(i));
            if extend < open {
                ins[i][j] = extend.saturating_add(nuc_prior);
                ins_src[i][j] = InsertSource::ExtendInsert;
            } else {
                ins[i][j] = open.saturating_add(nuc_prior);
                ins_src[i][j] = InsertSource::OpenFromMatch;
            }
        }
    }

    // Free terminal gap against the haplotype: the read need not reach the
    // end of the window. Ties favor the smallest haplotype offset, matching
    // the ascending scan used while building the table.
    let mut best_i = 0usize;
    let mut best_score = m[0][r];
    for i in 1..=h {
        if m[i][r] < best_score {
            best_score = m[i][r];
            best_i = i;
        }
    }

    let traceback = if want_traceback {
        Some(replay_traceback(
            haplotype, read, &m_src, &d_src, &ins_src, best_i, r,
        ))
    } else {
        None
    };

    AlignmentResult {
        phred_score: best_score,
        traceback,
    }
}

fn replay_traceback(
    haplotype: &[u8],
    read: &[u8],
    m_src: &[Vec<State>],
    d_src: &[Vec<DeleteSource>],
    ins_src: &[Vec<InsertSource>],
    mut i: usize,
    mut j: usize,
) -> Traceback {
    let mut state = State::Match;
    let mut hap_out = Vec::new();
    let mut read_out = Vec::new();

    while j > 0 {
        match state {
            State::Match => {
                hap_out.push(haplotype[i - 1]);
                read_out.push(read[j - 1]);
                let next = m_src[i][j];
                i -= 1;
                j -= 1;
                state = next;
            }
            State::Delete => {
                hap_out.push(haplotype[i - 1]);
                read_out.push(b'-');
                let next = match d_src[i][j] {
                    DeleteSource::ExtendDelete => State::Delete,
                    DeleteSource::OpenFromMatch => State::Match,
                    DeleteSource::OpenFromInsert => State::Insert,
                };
                i -= 1;
                state = next;
            }
            State::Insert => {
                hap_out.push(b'-');
                read_out.push(read[j - 1]);
                let next = match ins_src[i][j] {
                    InsertSource::ExtendInsert => State::Insert,
                    InsertSource::OpenFromMatch => State::Match,
                };
                j -= 1;
                state = next;
            }
        }
    }

    hap_out.reverse();
    read_out.reverse();
    Traceback {
        haplotype_aligned: hap_out,
        read_aligned: read_out,
        haplotype_start: i,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_gap_open(len: usize, value: i32) -> Vec<i32> {
        vec![value; len]
    }

    #[test]
    fn identical_sequences_score_zero() {
        let haplotype = b"NNNNNNNNACGTNNNNNNN";
        let read = b"ACGT";
        let qualities = [30u8, 30, 30, 30];
        let result = align(
            haplotype,
            read,
            &qualities,
            &flat_gap_open(haplotype.len(), 40),
            4,
            4,
            true,
        );
        assert_eq!(result.phred_score, 0);
        let tb = result.traceback.unwrap();
        assert_eq!(tb.haplotype_aligned, b"ACGT");
        assert_eq!(tb.read_aligned, b"ACGT");
    }

    #[test]
    fn snp_score_equals_quality_clamped_at_three_times_nuc_prior() {
        let nuc_prior = 4;
        let threshold = 3 * nuc_prior;
        let core = b"ATG";
        let mut haplotype = Vec::new();
        haplotype.extend_from_slice(b"NNNNNNN");
        haplotype.extend_from_slice(core);
        haplotype.extend_from_slice(b"NNNNNNNN");
        let read = b"TTG";
        let gap_open = flat_gap_open(haplotype.len(), i32::MAX / 8);

        for mismatch_quality in 0..threshold {
            let qualities = [mismatch_quality as u8, 10, 10];
            let result = align(&haplotype, read, &qualities, &gap_open, 1, nuc_prior, true);
            assert_eq!(result.phred_score, mismatch_quality);
            assert_eq!(result.traceback.unwrap().haplotype_aligned, b"ATG");
        }

        let qualities = [threshold as u8, 10, 10];
        let result = align(&haplotype, read, &qualities, &gap_open, 1, nuc_prior, true);
        assert_eq!(result.phred_score, threshold);
        assert_eq!(result.traceback.unwrap().haplotype_aligned, b"NNN");
    }

    #[test]
    fn single_base_deletion_costs_the_gap_open_entry() {
        let haplotype = b"NNNNNNNACGTNNNNNNN";
        // read omits the 'G'
        let read = b"ACT";
        let qualities = [30u8, 30, 30];
        let mut gap_open = flat_gap_open(haplotype.len(), 40);
        gap_open[9] = 25; // the 'G' position
        let result = align(haplotype, read, &qualities, &gap_open, 10, 4, true);
        assert_eq!(result.phred_score, 25);
    }

    #[test]
    fn single_base_insertion_costs_gap_open_plus_nuc_prior() {
        let haplotype = b"NNNNNNNNACGTNNNNNNNN";
        // read has an extra 'T' inserted after 'AC'
        let read = b"ACTGT";
        let qualities = [30u8, 30, 30, 30, 30];
        let gap_open = flat_gap_open(haplotype.len(), 40);
        let result = align(haplotype, read, &qualities, &gap_open, 10, 4, false);
        assert_eq!(result.phred_score, 40 + 4);
    }

    #[test]
    fn leading_and_trailing_haplotype_is_free() {
        let haplotype = b"NNNNNNNNNNNNNNNACGT";
        let read = b"ACGT";
        let qualities = [30u8, 30, 30, 30];
        let result = align(
            haplotype,
            read,
            &qualities,
            &flat_gap_open(haplotype.len(), 40),
            4,
            4,
            false,
        );
        assert_eq!(result.phred_score, 0);
    }
}
