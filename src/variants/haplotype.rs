// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A haplotype: a reference window plus the sorted, deduplicated set of
//! variants that distinguish it from the reference.

use std::rc::Rc;

use crate::utils::{BasePairSequence, Interval, Region, ReferenceWindow};
use crate::variants::model::AtomicVariant;
use crate::variants::normalizer;

#[derive(Clone, Debug)]
pub struct Haplotype {
    ref_window: Rc<ReferenceWindow>,
    variants: Vec<AtomicVariant>,
}

impl Haplotype {
    /// Build a haplotype from a set of variants against the same reference
    /// window. Variants are sorted and deduplicated; the reference
    /// haplotype is represented by an empty variant list.
    pub fn build(ref_window: Rc<ReferenceWindow>, variants: impl IntoIterator<Item = AtomicVariant>) -> Self {
        let mut variants: Vec<AtomicVariant> = variants.into_iter().collect();
        variants.sort();
        variants.dedup();
        Haplotype {
            ref_window,
            variants,
        }
    }

    pub fn ref_window(&self) -> &Rc<ReferenceWindow> {
        &self.ref_window
    }

    pub fn variants(&self) -> &[AtomicVariant] {
        &self.variants
    }

    pub fn contains(&self, variant: &AtomicVariant) -> bool {
        self.variants.contains(variant)
    }

    pub fn is_reference(&self) -> bool {
        self.variants.is_empty()
    }

    /// Whether this haplotype carries any variant that actually differs
    /// from the reference somewhere inside `region`. An MNP only counts if
    /// one of the positions it touches is both inside `region` and actually
    /// mismatched, since an MNP may carry matching bases at either end once
    /// it has absorbed a run of adjacent SNPs.
    pub fn is_reference_over(&self, region: &Region) -> bool {
        !self.variants.iter().any(|v| self.variant_differs_within(v, region))
    }

    fn variant_differs_within(&self, variant: &AtomicVariant, region: &Region) -> bool {
        if !variant.region().overlaps(region) {
            return false;
        }
        if !variant.is_mnp() {
            return true;
        }
        let ref_seq = variant.ref_subsequence();
        ref_seq
            .iter()
            .zip(variant.alt().iter())
            .enumerate()
            .any(|(offset, (r, a))| {
                let pos = variant.region().start() + offset as i64;
                r != a && region.interval().contains_point(pos)
            })
    }

    /// Build the actual base sequence this haplotype implies over
    /// `mini_region`, flanked by `padding` bases of reference context on
    /// either side: copy reference up to each variant's start, splice in
    /// its `alt`, repeat, then copy reference through the region's end.
    /// Every variant used must lie entirely within `mini_region` and the
    /// variants must not overlap one another.
    pub fn materialize(&self, mini_region: &Region, padding: i64) -> BasePairSequence {
        let mut ordered: Vec<&AtomicVariant> = self
            .variants
            .iter()
            .filter(|v| v.region().start() >= mini_region.start() && v.region().end() <= mini_region.end())
            .collect();
        ordered.sort();

        let mut bases: Vec<u8> = self
            .ref_window
            .iter_forward(Interval::new(mini_region.start() - padding, mini_region.start()))
            .collect();

        let mut cursor = mini_region.start();
        for variant in ordered {
            assert!(
                variant.region().start() >= cursor,
                "bug: overlapping variants passed to materialize"
            );
            bases.extend(self.ref_window.iter_forward(Interval::new(cursor, variant.region().start())));
            bases.extend(variant.alt().iter());
            cursor = variant.region().end();
        }
        bases.extend(self.ref_window.iter_forward(Interval::new(cursor, mini_region.end())));
        bases.extend(self.ref_window.iter_forward(Interval::new(mini_region.end(), mini_region.end() + padding)));
        BasePairSequence::new(bases)
    }

    /// Re-derive this haplotype's variants by materializing its implied
    /// sequence over each of `mini_regions` and running the global
    /// alignment normalizer against the unmutated reference, rather than
    /// trusting whatever regions the variants already carry. Falls back to
    /// the untouched variants of a mini-region the normalizer has to skip
    /// (e.g. because the edit is larger than it can afford to align).
    pub fn normalize_via_nw(&self, mini_regions: &[Region], gap_open: i32, gap_extend: i32) -> Haplotype {
        let mut atoms = Vec::new();
        for region in mini_regions {
            let alt_seq = self.materialize(region, 0);
            match normalizer::normalize(&self.ref_window, region.clone(), &alt_seq, normalizer::DEFAULT_MISMATCH, gap_open, gap_extend) {
                Ok(vs) => atoms.extend(vs),
                Err(_skip) => atoms.extend(
                    self.variants
                        .iter()
                        .filter(|v| region.contains(v.region()))
                        .cloned(),
                ),
            }
        }
        Haplotype::build(self.ref_window.clone(), atoms)
    }

    /// Collapse runs of SNPs into single MNP variants. A run is a maximal
    /// stretch of the sorted variant set containing only SNPs; any other
    /// variant (an indel, an already-merged MNP, ...) breaks it, but two
    /// SNPs in the same run merge even when they are not genomically
    /// abutting -- the gap between them is filled with reference bases.
    /// Mirrors `mnpFromSNPs`/`withMNPs` in the original C++ source.
    pub fn merge_into_mnps(&self) -> Haplotype {
        let mut merged = Vec::new();
        let mut run: Vec<&AtomicVariant> = Vec::new();

        for variant in &self.variants {
            if variant.is_snp() {
                run.push(variant);
                continue;
            }
            self.flush_snp_run(&mut run, &mut merged);
            merged.push(variant.clone());
        }
        self.flush_snp_run(&mut run, &mut merged);

        Haplotype {
            ref_window: self.ref_window.clone(),
            variants: merged,
        }
    }

    /// Turn a run of SNPs into a single MNP spanning from the first SNP's
    /// start to the last SNP's end, splicing in reference bases at any
    /// position in that span the run doesn't itself cover. A run of fewer
    /// than two SNPs is passed through unchanged. Clears `run`.
    fn flush_snp_run(&self, run: &mut Vec<&AtomicVariant>, merged: &mut Vec<AtomicVariant>) {
        match run.len() {
            0 => {}
            1 => merged.push(run[0].clone()),
            _ => {
                let start = run[0].region().start();
                let end = run.last().unwrap().region().end();
                let contig = run[0].region().contig().to_string();
                let from_breakpoint = run.iter().any(|v| v.from_breakpoint());

                let mut alt = Vec::with_capacity((end - start) as usize);
                let mut next = 0usize;
                for pos in start..end {
                    if next < run.len() && run[next].region().start() == pos {
                        alt.push(run[next].alt().base(0));
                        next += 1;
                    } else {
                        alt.push(self.ref_base_at(pos));
                    }
                }

                merged.push(AtomicVariant::new(
                    self.ref_window.clone(),
                    Region::new(contig, Interval::new(start, end)),
                    BasePairSequence::new(alt),
                    false,
                    from_breakpoint,
                ));
            }
        }
        run.clear();
    }

    fn ref_base_at(&self, pos: i64) -> u8 {
        self.ref_window.sequence().base((pos - self.ref_window.region().start()) as usize)
    }

    /// Canonicalize: decompose every variant to its atomic parts, trim each,
    /// and re-merge adjacent SNPs into MNPs. Idempotent.
    pub fn normalize(&self) -> Haplotype {
        let mut atoms: Vec<AtomicVariant> = self
            .variants
            .iter()
            .flat_map(|v| {
                let parts = v.split();
                if parts.is_empty() {
                    vec![v.clone()]
                } else {
                    parts
                }
            })
            .map(|v| v.trim())
            .filter(|v| !(v.ref_len() == 0 && v.alt_len() == 0))
            .collect();
        atoms.sort();
        atoms.dedup();
        Haplotype {
            ref_window: self.ref_window.clone(),
            variants: atoms,
        }
        .merge_into_mnps()
    }

    /// A prior-only ordering between two haplotypes' variant sets, used to
    /// break ties between candidates that are otherwise equally supported
    /// by the data. Higher total log-prior (closer to zero) wins; a
    /// haplotype carrying a variant with no default prior never wins.
    pub fn is_more_likely_than(&self, other: &Haplotype) -> bool {
        let self_score = total_log_prior(self);
        let other_score = total_log_prior(other);
        match (self_score, other_score) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

fn total_log_prior(haplotype: &Haplotype) -> Option<f64> {
    let mut total = 0.0;
    for variant in &haplotype.variants {
        let p = variant.prior();
        if p.is_nan() {
            return None;
        }
        total += p.ln();
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{BasePairSequence, Interval, Region};

    fn window() -> Rc<ReferenceWindow> {
        Rc::new(ReferenceWindow::new(
            Region::new("chr1", Interval::new(0, 10)),
            BasePairSequence::from_str_unchecked("ACGTACGTAC"),
        ))
    }

    fn snp(w: &Rc<ReferenceWindow>, pos: i64, alt: u8) -> AtomicVariant {
        AtomicVariant::new(
            w.clone(),
            Region::new("chr1", Interval::new(pos, pos + 1)),
            BasePairSequence::new(vec![alt]),
            true,
            false,
        )
    }

    #[test]
    fn empty_variant_set_is_the_reference_haplotype() {
        let w = window();
        let h = Haplotype::build(w, Vec::new());
        assert!(h.is_reference());
    }

    #[test]
    fn adjacent_snps_merge_into_a_single_mnp() {
        let w = window();
        let h = Haplotype::build(w, vec![snp(&w, 0, b'T'), snp(&w, 1, b'T')]);
        let merged = h.merge_into_mnps();
        assert_eq!(merged.variants().len(), 1);
        assert_eq!(merged.variants()[0].alt().to_string(), "TT");
    }

    #[test]
    fn non_adjacent_snps_merge_with_reference_spliced_into_the_gap() {
        let w = window();
        let h = Haplotype::build(w.clone(), vec![snp(&w, 0, b'T'), snp(&w, 5, b'T')]);
        let merged = h.merge_into_mnps();
        assert_eq!(merged.variants().len(), 1);
        assert_eq!(merged.variants()[0].region(), &Region::new("chr1", Interval::new(0, 6)));
        // window() is "ACGTACGTAC": positions 1-4 ("CGTA") are untouched
        // reference, spliced between the two SNPs' alts.
        assert_eq!(merged.variants()[0].alt().to_string(), "TCGTAT");
    }

    #[test]
    fn an_indel_between_two_snps_breaks_the_run() {
        let w = window();
        let del = AtomicVariant::new(
            w.clone(),
            Region::new("chr1", Interval::new(2, 3)),
            BasePairSequence::new(Vec::new()),
            true,
            false,
        );
        let h = Haplotype::build(w.clone(), vec![snp(&w, 0, b'T'), del, snp(&w, 5, b'T')]);
        let merged = h.merge_into_mnps();
        assert_eq!(merged.variants().len(), 3);
    }

    #[test]
    fn normalize_is_idempotent() {
        let w = window();
        let h = Haplotype::build(w, vec![snp(&w, 0, b'T'), snp(&w, 1, b'T')]);
        let once = h.normalize();
        let twice = once.normalize();
        assert_eq!(once.variants(), twice.variants());
    }

    #[test]
    fn materialize_splices_alt_into_reference_context() {
        let w = window();
        let h = Haplotype::build(w.clone(), vec![snp(&w, 4, b'T')]);
        let seq = h.materialize(&Region::new("chr1", Interval::new(0, 10)), 0);
        assert_eq!(seq.to_string(), "ACGTTCGTAC");
    }

    #[test]
    fn materialize_flanks_with_real_reference_context_and_gap_past_the_window_edge() {
        let w = window();
        let h = Haplotype::build(w.clone(), Vec::new());
        let seq = h.materialize(&Region::new("chr1", Interval::new(8, 10)), 2);
        assert_eq!(seq.to_string(), "GTACNN");
    }

    #[test]
    fn is_reference_over_ignores_variants_outside_the_queried_region() {
        let w = window();
        let h = Haplotype::build(w.clone(), vec![snp(&w, 0, b'T')]);
        assert!(!h.is_reference_over(&Region::new("chr1", Interval::new(0, 1))));
        assert!(h.is_reference_over(&Region::new("chr1", Interval::new(5, 10))));
    }

    #[test]
    fn normalize_via_nw_canonicalizes_a_materialized_mini_region() {
        let w = Rc::new(ReferenceWindow::new(
            Region::new("chr1", Interval::new(0, 9)),
            BasePairSequence::from_str_unchecked("AAACGTAAA"),
        ));
        let compound = AtomicVariant::new(
            w.clone(),
            Region::new("chr1", Interval::new(0, 9)),
            BasePairSequence::from_str_unchecked("AAATGTAAA"),
            true,
            false,
        );
        let h = Haplotype::build(w.clone(), vec![compound]);
        let renormalized = h.normalize_via_nw(&[Region::new("chr1", Interval::new(0, 9))], 2300, 300);
        assert_eq!(renormalized.variants().len(), 1);
        assert_eq!(renormalized.variants()[0].region(), &Region::new("chr1", Interval::new(3, 4)));
        assert_eq!(renormalized.variants()[0].alt().to_string(), "T");
    }

    #[test]
    fn a_haplotype_with_a_more_probable_snp_set_outranks_a_rarer_one() {
        let w = window();
        let common = Haplotype::build(w, vec![snp(&w, 0, b'T')]);
        let w2 = window();
        let rare = Haplotype::build(
            w2,
            vec![AtomicVariant::new(
                w.clone(),
                Region::new("chr1", Interval::new(0, 1)),
                BasePairSequence::from_str_unchecked("T"),
                true,
                false,
            )
            .join(&AtomicVariant::new(
                w.clone(),
                Region::new("chr1", Interval::new(1, 1)),
                BasePairSequence::from_str_unchecked("GGGG"),
                true,
                false,
            ))
            .unwrap()],
        );
        assert!(common.is_more_likely_than(&rare));
    }
}
