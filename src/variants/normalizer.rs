// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Turning an arbitrary (possibly multi-base, possibly redundant) ref/alt
//! pair into its minimal, left-shifted [`AtomicVariant`] representation via
//! a full affine-gap global (Needleman-Wunsch/Gotoh) alignment. Unlike the
//! banded aligner in [`crate::alignment`], both sequences here are fully
//! consumed end to end -- there is no free terminal gap.

use std::rc::Rc;

use crate::errors::Skip;
use crate::utils::{BasePairSequence, Interval, Region, ReferenceWindow};
use crate::variants::model::AtomicVariant;

/// Cells beyond this are refused rather than computed: a run-away ref/alt
/// pair (e.g. a structural-variant-sized replacement fed in by mistake)
/// should not be allowed to allocate an unbounded DP table.
const MAX_CELLS: usize = 50_000;

const INF: i32 = i32::MAX / 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Src {
    Diag,
    Up,
    Left,
}

/// The mismatch cost, gap-open cost (constant term plus one linear unit)
/// and gap-extend cost used when a caller has no sample-specific error
/// model handy. Ratios follow the same penalty shape the banded aligner
/// charges: a gap costs roughly as much as two and a third mismatches to
/// open, then a third of a mismatch per extended base.
pub const DEFAULT_MISMATCH: i32 = 1000;
pub const DEFAULT_GAP_OPEN: i32 = 2300;
pub const DEFAULT_GAP_EXTEND: i32 = 300;

/// [`normalize`] with [`DEFAULT_MISMATCH`], [`DEFAULT_GAP_OPEN`] and
/// [`DEFAULT_GAP_EXTEND`].
pub fn normalize_default(
    ref_window: &Rc<ReferenceWindow>,
    region: Region,
    alt: &BasePairSequence,
) -> Result<Vec<AtomicVariant>, Skip> {
    normalize(ref_window, region, alt, DEFAULT_MISMATCH, DEFAULT_GAP_OPEN, DEFAULT_GAP_EXTEND)
}

/// Normalize `alt` against the reference bases covered by `region` (which
/// must lie inside `ref_window`), returning the minimal set of atomic
/// variants describing the same edit. A run of matching columns in the
/// alignment splits the edit into independent pieces; a run of mismatch
/// and/or gap columns becomes one atomic variant, trimmed of any shared
/// flank the split itself could not remove.
///
/// Ties in the alignment are broken in favor of continuing the diagonal
/// (match/mismatch) path for as long as possible: walking the traceback
/// backward from the end, this defers opening a gap for as long as
/// possible, which pushes it towards the start of the sequence.
pub fn normalize(
    ref_window: &Rc<ReferenceWindow>,
    region: Region,
    alt: &BasePairSequence,
    mismatch_cost: i32,
    gap_open: i32,
    gap_extend: i32,
) -> Result<Vec<AtomicVariant>, Skip> {
    let ref_seq = ref_window.sub_window(&region).sequence().clone();
    let r = ref_seq.as_bytes();
    let a = alt.as_bytes();

    let cells = (r.len() + 1).saturating_mul(a.len() + 1);
    if cells > MAX_CELLS {
        return Err(Skip::OversizedNormalization);
    }

    let (aligned_ref, aligned_alt) = align_global(r, a, mismatch_cost, gap_open, gap_extend);

    let mut variants = Vec::new();
    let mut ref_pos = region.start();
    let mut col = 0usize;
    let len = aligned_ref.len();
    while col < len {
        if aligned_ref[col] == aligned_alt[col] {
            ref_pos += 1;
            col += 1;
            continue;
        }
        let run_start = col;
        let mut run_ref_len = 0i64;
        let mut run_alt: Vec<u8> = Vec::new();
        while col < len && aligned_ref[col] != aligned_alt[col] {
            if aligned_ref[col] != b'-' {
                run_ref_len += 1;
            }
            if aligned_alt[col] != b'-' {
                run_alt.push(aligned_alt[col]);
            }
            col += 1;
        }
        let _ = run_start;
        let region = Region::new(ref_window.region().contig(), Interval::new(ref_pos, ref_pos + run_ref_len));
        let variant = AtomicVariant::new(ref_window.clone(), region, BasePairSequence::new(run_alt), true, false).trim();
        if variant.ref_len() > 0 || variant.alt_len() > 0 {
            variants.push(variant);
        }
        ref_pos += run_ref_len;
    }
    Ok(variants)
}

fn align_global(r: &[u8], a: &[u8], mismatch_cost: i32, gap_open: i32, gap_extend: i32) -> (Vec<u8>, Vec<u8>) {
    let n = r.len();
    let m = a.len();

    let mut mm = vec![vec![0i32; m + 1]; n + 1];
    let mut del = vec![vec![INF; m + 1]; n + 1];
    let mut ins = vec![vec![INF; m + 1]; n + 1];
    let mut mm_src = vec![vec![Src::Diag; m + 1]; n + 1];
    let mut del_from_gap = vec![vec![false; m + 1]; n + 1];
    let mut ins_from_gap = vec![vec![false; m + 1]; n + 1];

    for i in 1..=n {
        del[i][0] = gap_open + (i as i32 - 1) * gap_extend;
        del_from_gap[i][0] = i > 1;
        mm[i][0] = INF;
    }
    for j in 1..=m {
        ins[0][j] = gap_open + (j as i32 - 1) * gap_extend;
        ins_from_gap[0][j] = j > 1;
        mm[0][j] = INF;
    }
    mm[0][0] = 0;

    for i in 1..=n {
        for j in 1..=m {
            let sub_cost = if r[i - 1] == a[j - 1] { 0 } else { mismatch_cost };
            let best_diag_pred = mm[i - 1][j - 1].min(del[i - 1][j - 1]).min(ins[i - 1][j - 1]);
            mm[i][j] = best_diag_pred + sub_cost;
            mm_src[i][j] = Src::Diag;

            let extend = del[i - 1][j] + gap_extend;
            let open = mm[i - 1][j].min(ins[i - 1][j]) + gap_open;
            if extend <= open {
                del[i][j] = extend;
                del_from_gap[i][j] = true;
            } else {
                del[i][j] = open;
                del_from_gap[i][j] = false;
            }

            let extend = ins[i][j - 1] + gap_extend;
            let open = mm[i][j - 1] + gap_open;
            if extend <= open {
                ins[i][j] = extend;
                ins_from_gap[i][j] = true;
            } else {
                ins[i][j] = open;
                ins_from_gap[i][j] = false;
            }
        }
    }

    let best = mm[n][m].min(del[n][m]).min(ins[n][m]);
    let mut state = if mm[n][m] == best {
        Src::Diag
    } else if del[n][m] == best {
        Src::Up
    } else {
        Src::Left
    };

    let mut i = n;
    let mut j = m;
    let mut out_ref = Vec::new();
    let mut out_alt = Vec::new();

    while i > 0 || j > 0 {
        match state {
            Src::Diag => {
                out_ref.push(r[i - 1]);
                out_alt.push(a[j - 1]);
                let prev_diag = mm[i - 1][j - 1];
                let prev_del = del[i - 1][j - 1];
                let prev_ins = ins[i - 1][j - 1];
                state = if prev_diag <= prev_del && prev_diag <= prev_ins {
                    Src::Diag
                } else if prev_del <= prev_ins {
                    Src::Up
                } else {
                    Src::Left
                };
                i -= 1;
                j -= 1;
            }
            Src::Up => {
                out_ref.push(r[i - 1]);
                out_alt.push(b'-');
                if !del_from_gap[i][j] {
                    state = if mm[i - 1][j] <= ins[i - 1][j] {
                        Src::Diag
                    } else {
                        Src::Left
                    };
                }
                i -= 1;
            }
            Src::Left => {
                out_ref.push(b'-');
                out_alt.push(a[j - 1]);
                if !ins_from_gap[i][j] {
                    state = Src::Diag;
                }
                j -= 1;
            }
        }
    }

    out_ref.reverse();
    out_alt.reverse();
    (out_ref, out_alt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Interval;

    fn window(seq: &str) -> Rc<ReferenceWindow> {
        Rc::new(ReferenceWindow::new(
            Region::new("chr1", Interval::new(0, seq.len() as i64)),
            BasePairSequence::from_str_unchecked(seq),
        ))
    }

    #[test]
    fn redundant_flanks_collapse_to_the_minimal_snp() {
        let w = window("AAACGTAAA");
        let region = Region::new("chr1", Interval::new(0, 9));
        let alt = BasePairSequence::from_str_unchecked("AAATGTAAA");
        let variants = normalize(&w, region, &alt, 1000, 2300, 300).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].region(), &Region::new("chr1", Interval::new(3, 4)));
        assert_eq!(variants[0].alt().to_string(), "T");
    }

    #[test]
    fn single_base_deletion_in_a_homopolymer_left_aligns() {
        let w = window("CAAAC");
        let region = Region::new("chr1", Interval::new(0, 5));
        let alt = BasePairSequence::from_str_unchecked("CAAC");
        let variants = normalize(&w, region, &alt, 1000, 2300, 300).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].region(), &Region::new("chr1", Interval::new(1, 2)));
        assert!(variants[0].alt().is_empty());
    }

    #[test]
    fn normalizing_an_already_normalized_variant_is_a_no_op() {
        let w = window("AAACGTAAA");
        let region = Region::new("chr1", Interval::new(3, 4));
        let alt = BasePairSequence::from_str_unchecked("T");
        let once = normalize(&w, region.clone(), &alt, 1000, 2300, 300).unwrap();
        assert_eq!(once.len(), 1);
        let twice = normalize(&w, once[0].region().clone(), once[0].alt(), 1000, 2300, 300).unwrap();
        assert_eq!(twice.len(), 1);
        assert_eq!(once[0].region(), twice[0].region());
        assert_eq!(once[0].alt(), twice[0].alt());
    }

    #[test]
    fn two_separated_mismatches_decompose_into_two_snps() {
        let w = window("AAACGTGGGCATAAA");
        let region = Region::new("chr1", Interval::new(0, 15));
        let alt = BasePairSequence::from_str_unchecked("AAATGTGGGCAGAAA");
        let variants = normalize(&w, region, &alt, 1000, 2300, 300).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].region(), &Region::new("chr1", Interval::new(3, 4)));
        assert_eq!(variants[0].alt().to_string(), "T");
        assert_eq!(variants[1].region(), &Region::new("chr1", Interval::new(11, 12)));
        assert_eq!(variants[1].alt().to_string(), "G");
    }

    #[test]
    fn a_snp_and_a_separate_deletion_decompose_independently() {
        let w = window("AAACGTAAACAAATAAA");
        let region = Region::new("chr1", Interval::new(0, 17));
        let alt = BasePairSequence::from_str_unchecked("AAATGTAAACAAAAAA");
        let variants = normalize(&w, region, &alt, 1000, 2300, 300).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].region(), &Region::new("chr1", Interval::new(3, 4)));
        assert_eq!(variants[0].alt().to_string(), "T");
        assert!(variants[1].is_deletion());
    }

    #[test]
    fn oversized_input_is_skipped_rather_than_computed() {
        let huge_ref = "A".repeat(300);
        let huge_alt = "T".repeat(300);
        let w = window(&huge_ref);
        let region = Region::new("chr1", Interval::new(0, huge_ref.len() as i64));
        let alt = BasePairSequence::from_str_unchecked(&huge_alt);
        let result = normalize(&w, region, &alt, 1000, 2300, 300);
        assert_eq!(result, Err(Skip::OversizedNormalization));
    }

    #[test]
    fn normalize_default_uses_the_documented_penalty_constants() {
        let w = window("CAAAC");
        let region = Region::new("chr1", Interval::new(0, 5));
        let alt = BasePairSequence::from_str_unchecked("CAAC");
        let variants = normalize_default(&w, region, &alt).unwrap();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].is_deletion());
    }
}
