// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Cross-module properties that don't fit naturally in any one unit's
//! `#[cfg(test)]` block: a haplotype built from candidate variants, spliced
//! back into a sequence, mapped and aligned against itself, and a variant
//! set normalized through the global aligner down to its atomic form.

use std::rc::Rc;

use varcall_core::alignment::{align, compute_gap_open};
use varcall_core::likelihood::read_likelihood;
use varcall_core::mapping::{alignable_range, KmerIndex};
use varcall_core::utils::{BasePairSequence, Interval, Region, ReferenceWindow};
use varcall_core::variants::normalizer;
use varcall_core::variants::{AtomicVariant, Haplotype};

/// Route `log` output from the core (normally wired to `fern` by the CLI,
/// which these tests never invoke) through `env_logger` instead, so a
/// failing case can be re-run with `RUST_LOG=debug` for a trace of what the
/// normalizer or mapper actually did.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn reference(contig: &str, seq: &str) -> Rc<ReferenceWindow> {
    Rc::new(ReferenceWindow::new(
        Region::new(contig, Interval::new(0, seq.len() as i64)),
        BasePairSequence::from_str_unchecked(seq),
    ))
}

fn snp(w: &Rc<ReferenceWindow>, pos: i64, alt: u8) -> AtomicVariant {
    AtomicVariant::new(
        w.clone(),
        Region::new(w.region().contig(), Interval::new(pos, pos + 1)),
        BasePairSequence::new(vec![alt]),
        true,
        false,
    )
}

/// A haplotype carrying one SNP, materialized with reference flanks padded
/// out to `N` (mirroring how a mini-region's aligner window is built in
/// practice), mapped and scored against a read drawn verbatim from its own
/// materialized sequence -- exercising the mapper, the gap-open model and
/// the aligner together the way [`likelihood::read_likelihood`] chains
/// them, rather than each in isolation.
#[test]
fn a_materialized_haplotype_maps_and_aligns_perfectly_against_itself() {
    init_logging();
    let core_ref = "ACGTACGTACGT";
    let w = reference("chr1", core_ref);
    let core_region = Region::new("chr1", Interval::new(0, core_ref.len() as i64));
    let h = Haplotype::build(w.clone(), vec![snp(&w, 4, b'T')]);

    let haplotype_seq = h.materialize(&core_region, 8);
    let haplotype_bytes = haplotype_seq.as_bytes();
    assert_eq!(haplotype_bytes.len(), 28);

    let read = &haplotype_bytes[8..20];
    let qualities = vec![30u8; read.len()];

    let index = KmerIndex::new(5, haplotype_bytes);
    let gap_open = compute_gap_open(haplotype_bytes, &[40, 30, 20]);
    let allowed = alignable_range(haplotype_bytes.len() as i64, read.len() as i64, 7);

    let lik = read_likelihood(&index, haplotype_bytes, read, &qualities, 60, &gap_open, 4, 4, None, allowed);
    assert!(*lik > 0.99, "expected near-certain likelihood for a read drawn from its own haplotype, got {}", *lik);

    let window = &haplotype_bytes[1..28];
    let window_gap_open = &gap_open[1..28];
    let result = align(window, read, &qualities, window_gap_open, 4, 4, false);
    assert_eq!(result.phred_score, 0, "a read identical to its source haplotype should align for free");
}

/// The set-producing normalizer decomposes two non-adjacent edits inside
/// one materialized mini-region into separate atomic variants, and
/// reconstructing the reference with every emitted edit applied reproduces
/// the materialized alt exactly -- the property the normalizer must hold
/// regardless of how many edits a region's alignment implies.
#[test]
fn normalize_via_nw_recovers_every_edit_in_a_compound_haplotype() {
    init_logging();
    let refseq = "AAACGTGGGCATAAA";
    let altseq = "AAATGTGGGCAGAAA";
    let w = reference("chr1", refseq);
    let region = Region::new("chr1", Interval::new(0, refseq.len() as i64));

    let compound = AtomicVariant::new(w.clone(), region.clone(), BasePairSequence::from_str_unchecked(altseq), true, false);
    let h = Haplotype::build(w.clone(), vec![compound]);

    let renormalized = h.normalize_via_nw(&[region.clone()], normalizer::DEFAULT_GAP_OPEN, normalizer::DEFAULT_GAP_EXTEND);
    assert_eq!(renormalized.variants().len(), 2, "two separated mismatches must decompose into two atoms");

    let reconstructed = renormalized.materialize(&region, 0);
    assert_eq!(reconstructed.to_string(), altseq, "reapplying the decomposed atoms must reproduce the original alt exactly");
}

/// The spec's `AGG` -> `ACCG` worked example is internally inconsistent (a
/// net +1 length change cannot be explained by a pure 2-base insertion with
/// the rest of the reference unchanged); what the normalizer guarantees
/// instead, and what this checks, is that whatever atoms it emits
/// reconstruct the alt exactly.
#[test]
fn normalize_reconstructs_the_alt_even_for_the_inconsistent_agg_accg_case() {
    init_logging();
    let refseq = "AGG";
    let altseq = "ACCG";
    let w = reference("chr1", refseq);
    let region = Region::new("chr1", Interval::new(0, refseq.len() as i64));
    let alt = BasePairSequence::from_str_unchecked(altseq);

    let variants = normalizer::normalize_default(&w, region.clone(), &alt).expect("a 3x4 alignment must not be skipped");
    let h = Haplotype::build(w.clone(), variants);
    let reconstructed = h.materialize(&region, 0);
    assert_eq!(reconstructed.to_string(), altseq);
}

/// `Haplotype::normalize`'s split-and-merge canonicalization and the global
/// NW normalizer are two independent routes to an atomic representation;
/// for a haplotype whose variants are already non-overlapping atoms, both
/// must materialize to the same sequence as the haplotype itself.
#[test]
fn split_based_and_nw_based_normalization_agree_on_the_materialized_sequence() {
    init_logging();
    let refseq = "ACGTACGTAC";
    let w = reference("chr1", refseq);
    let region = Region::new("chr1", Interval::new(0, refseq.len() as i64));
    let h = Haplotype::build(w.clone(), vec![snp(&w, 2, b'T'), snp(&w, 7, b'A')]);

    let direct = h.materialize(&region, 0);
    let via_split = h.normalize().materialize(&region, 0);
    let via_nw = h
        .normalize_via_nw(&[region.clone()], normalizer::DEFAULT_GAP_OPEN, normalizer::DEFAULT_GAP_EXTEND)
        .materialize(&region, 0);

    assert_eq!(direct.to_string(), "ACTTACGAAC");
    assert_eq!(via_split.to_string(), direct.to_string());
    assert_eq!(via_nw.to_string(), direct.to_string());
}
