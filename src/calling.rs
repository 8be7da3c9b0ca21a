// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The mechanical layer between an aligned read and a candidate
//! [`AtomicVariant`]: decode a CIGAR against its reference window, collect
//! per-sample read support for whatever it implies, and turn the
//! well-supported candidates into [`VcfRecord`]s. None of this touches the
//! aligner, mapper or normalizer directly -- it produces the raw,
//! un-normalized candidates those layers then canonicalize.

use std::rc::Rc;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use rust_htslib::bam::record::Cigar;

use crate::config::FilterThresholds;
use crate::io::reads::Read;
use crate::io::vcf::VcfRecord;
use crate::utils::{BasePairSequence, Interval, Region, ReferenceWindow};
use crate::variants::AtomicVariant;

/// Whether `read`'s full aligned span lies inside `window`: CIGAR decoding
/// indexes `window` directly, so a read straddling its edge would either
/// panic or silently read `N` padding as reference. Callers should skip
/// reads this returns `false` for.
pub fn read_fits_window(read: &Read, window: &Region) -> bool {
    let ref_len: i64 = read
        .cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(n) | Cigar::Equal(n) | Cigar::Diff(n) | Cigar::Del(n) | Cigar::RefSkip(n) => *n as i64,
            _ => 0,
        })
        .sum();
    window.interval().contains_interval(&Interval::new(read.start, read.start + ref_len))
}

/// Decode one read's CIGAR into the candidate edits it carries against
/// `ref_window`, dropping mismatched bases below the sample's minimum base
/// quality. Soft/hard clips and padding are consumed without emitting a
/// variant; an `N` reference-skip (an intron, in RNA alignments) simply
/// advances the reference cursor.
pub fn candidate_variants_from_read(
    read: &Read,
    ref_window: &Rc<ReferenceWindow>,
    filters: &FilterThresholds,
) -> Vec<AtomicVariant> {
    if read.mapq < *filters.min_mapq() {
        return Vec::new();
    }

    let mut variants = Vec::new();
    let mut ref_pos = read.start;
    let mut read_pos: usize = 0;

    for op in &read.cigar {
        match op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                let len = *len as i64;
                for offset in 0..len {
                    let rpos = ref_pos + offset;
                    let ref_base = ref_window.sequence().base((rpos - ref_window.region().start()) as usize);
                    let read_idx = read_pos + offset as usize;
                    let query_base = read.sequence[read_idx];
                    let qual = read.qualities.get(read_idx).copied().unwrap_or(0);
                    if query_base != ref_base && qual >= *filters.min_base_qual() {
                        let region = Region::new(ref_window.region().contig(), Interval::new(rpos, rpos + 1));
                        variants.push(AtomicVariant::new(
                            ref_window.clone(),
                            region,
                            BasePairSequence::new(vec![query_base]),
                            true,
                            false,
                        ));
                    }
                }
                ref_pos += len;
                read_pos += len as usize;
            }
            Cigar::Ins(len) => {
                let len = *len as usize;
                let region = Region::new(ref_window.region().contig(), Interval::new(ref_pos, ref_pos));
                let alt = BasePairSequence::new(read.sequence[read_pos..read_pos + len].to_vec());
                variants.push(AtomicVariant::new(ref_window.clone(), region, alt, true, false));
                read_pos += len;
            }
            Cigar::Del(len) => {
                let len = *len as i64;
                let region = Region::new(ref_window.region().contig(), Interval::new(ref_pos, ref_pos + len));
                variants.push(AtomicVariant::new(ref_window.clone(), region, BasePairSequence::new(Vec::new()), true, false));
                ref_pos += len;
            }
            Cigar::RefSkip(len) => ref_pos += *len as i64,
            Cigar::SoftClip(len) => read_pos += *len as usize,
            Cigar::HardClip(_) | Cigar::Pad(_) => {}
            Cigar::Back(_) => {}
        }
    }
    variants
}

/// Tally identical candidates across a set of reads. Block-sized read sets
/// are small enough that a linear scan beats standing up a `Hash` impl for
/// [`AtomicVariant`] (its equality already ignores which reference window
/// backs it, which a derived `Hash` would have to match).
pub fn tally_candidates(reads: &[Vec<AtomicVariant>]) -> Vec<(AtomicVariant, usize)> {
    let mut tallies: Vec<(AtomicVariant, usize)> = Vec::new();
    for per_read in reads {
        for variant in per_read {
            match tallies.iter_mut().find(|(existing, _)| existing == variant) {
                Some(entry) => entry.1 += 1,
                None => tallies.push((variant.clone(), 1)),
            }
        }
    }
    tallies
}

/// A naive Phred-scaled call: `-10 * log10(1 - support_fraction)`, floored
/// so a variant with unanimous support does not produce an infinite QUAL.
fn naive_qual(support: usize, total: usize) -> f64 {
    let fraction = support as f64 / total.max(1) as f64;
    -10.0 * (1.0 - fraction).max(1e-6).log10()
}

/// A naive genotype call from a single sample's read support, used only to
/// populate the FORMAT/GT column -- not a substitute for a real likelihood
/// model over [`crate::variants::Haplotype`] candidates.
fn naive_genotype(support: usize, total: usize, ploidy: i64) -> String {
    if total == 0 {
        return (0..ploidy.max(1)).map(|_| ".").collect::<Vec<_>>().join("/");
    }
    let fraction = support as f64 / total as f64;
    if ploidy <= 1 {
        return if fraction > 0.5 { "1".to_string() } else { "0".to_string() };
    }
    if fraction > 0.8 {
        "1/1".to_string()
    } else if support > 0 {
        "0/1".to_string()
    } else {
        "0/0".to_string()
    }
}

/// Build one [`VcfRecord`] per candidate that clears `min_support` reads in
/// at least one sample, given each sample's name, its per-read candidate
/// lists and its ploidy.
pub fn records_from_samples(
    samples: &[(String, Vec<Vec<AtomicVariant>>, i64)],
    min_support: usize,
) -> Vec<VcfRecord> {
    let all_reads: Vec<Vec<AtomicVariant>> = samples.iter().flat_map(|(_, reads, _)| reads.iter().cloned()).collect_vec();
    let combined = tally_candidates(&all_reads);
    let total_reads: usize = samples.iter().map(|(_, reads, _)| reads.len()).sum();

    let mut records: Vec<VcfRecord> = combined
        .into_iter()
        .filter(|(_, support)| *support >= min_support)
        .map(|(variant, support)| {
            let sample_values: Vec<Vec<String>> = samples
                .iter()
                .map(|(_, reads, ploidy)| {
                    let sample_support = reads.iter().filter(|cands| cands.contains(&variant)).count();
                    vec![
                        naive_genotype(sample_support, reads.len(), *ploidy),
                        sample_support.to_string(),
                    ]
                })
                .collect();
            VcfRecord {
                contig: variant.region().contig().to_string(),
                pos: variant.region().start(),
                id: None,
                reference: variant.ref_subsequence().to_string(),
                alts: vec![variant.alt().to_string()],
                qual: Some(naive_qual(support, total_reads)),
                filters: Vec::new(),
                info: vec![
                    ("DP".to_string(), total_reads.to_string()),
                    ("AD".to_string(), support.to_string()),
                ],
                format_keys: vec!["GT".to_string(), "AD".to_string()],
                sample_values,
            }
        })
        .collect();
    records.sort_by(|a, b| {
        a.pos
            .cmp(&b.pos)
            .then_with(|| a.reference.cmp(&b.reference))
            .then_with(|| OrderedFloat(b.qual.unwrap_or(0.0)).cmp(&OrderedFloat(a.qual.unwrap_or(0.0))))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{BasePairSequence as Seq, Interval as Iv};

    fn window() -> Rc<ReferenceWindow> {
        Rc::new(ReferenceWindow::new(
            Region::new("chr1", Iv::new(0, 10)),
            Seq::from_str_unchecked("ACGTACGTAC"),
        ))
    }

    fn read(start: i64, sequence: &str, cigar: Vec<Cigar>, mapq: u8) -> Read {
        Read {
            sample: "s1".to_string(),
            sequence: sequence.as_bytes().to_vec(),
            qualities: vec![40; sequence.len()],
            cigar,
            start,
            flags: 0,
            mapq,
            insert_size: 0,
            mate_start: 0,
            mate_contig: None,
        }
    }

    #[test]
    fn a_matching_read_yields_no_candidates() {
        let w = window();
        let r = read(0, "ACGTACGTAC", vec![Cigar::Match(10)], 60);
        let filters = FilterThresholds::default();
        assert!(candidate_variants_from_read(&r, &w, &filters).is_empty());
    }

    #[test]
    fn a_mismatched_base_becomes_a_snp_candidate() {
        let w = window();
        let r = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        let filters = FilterThresholds::default();
        let variants = candidate_variants_from_read(&r, &w, &filters);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].region(), &Region::new("chr1", Iv::new(4, 5)));
        assert_eq!(variants[0].alt().to_string(), "T");
    }

    #[test]
    fn low_quality_mismatches_are_not_candidates() {
        let w = window();
        let mut r = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        r.qualities[4] = 2;
        let filters = FilterThresholds::default();
        assert!(candidate_variants_from_read(&r, &w, &filters).is_empty());
    }

    #[test]
    fn reads_below_min_mapq_are_dropped_entirely() {
        let w = window();
        let r = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 5);
        let filters = FilterThresholds::default();
        assert!(candidate_variants_from_read(&r, &w, &filters).is_empty());
    }

    #[test]
    fn an_insertion_cigar_becomes_a_zero_length_region_candidate() {
        let w = window();
        // ref[2..4] = "GT", ref[4..6] = "AC"; "AA" is spliced in between.
        let r = read(2, "GTAAAC", vec![Cigar::Match(2), Cigar::Ins(2), Cigar::Match(2)], 60);
        let filters = FilterThresholds::default();
        let variants = candidate_variants_from_read(&r, &w, &filters);
        assert_eq!(variants.len(), 1);
        assert!(variants[0].is_insertion());
        assert_eq!(variants[0].region().start(), 4);
        assert_eq!(variants[0].alt().to_string(), "AA");
    }

    #[test]
    fn a_deletion_cigar_becomes_an_empty_alt_candidate() {
        let w = window();
        // ref[2..3] = "G", ref[3..5] = "TA" deleted, ref[5..6] = "C".
        let r = read(2, "GC", vec![Cigar::Match(1), Cigar::Del(2), Cigar::Match(1)], 60);
        let filters = FilterThresholds::default();
        let variants = candidate_variants_from_read(&r, &w, &filters);
        assert_eq!(variants.len(), 1);
        assert!(variants[0].is_deletion());
        assert_eq!(variants[0].region(), &Region::new("chr1", Iv::new(3, 5)));
    }

    #[test]
    fn naive_qual_caps_at_the_unanimous_support_floor() {
        approx::assert_relative_eq!(naive_qual(2, 2), 60.0, epsilon = 1e-9);
        approx::assert_relative_eq!(naive_qual(0, 2), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn tally_counts_identical_candidates_across_reads() {
        let w = window();
        let r1 = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        let r2 = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        let filters = FilterThresholds::default();
        let reads = vec![
            candidate_variants_from_read(&r1, &w, &filters),
            candidate_variants_from_read(&r2, &w, &filters),
        ];
        let tallies = tally_candidates(&reads);
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].1, 2);
    }

    #[test]
    fn records_from_samples_drops_candidates_below_the_support_floor() {
        let w = window();
        let supported = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        let filters = FilterThresholds::default();
        let reads = vec![candidate_variants_from_read(&supported, &w, &filters)];
        let records = records_from_samples(&[("s1".to_string(), reads, 2)], 2);
        assert!(records.is_empty());
    }

    #[test]
    fn records_from_samples_emits_a_record_for_well_supported_candidates() {
        let w = window();
        let r1 = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        let r2 = read(0, "ACGTTCGTAC", vec![Cigar::Match(10)], 60);
        let filters = FilterThresholds::default();
        let reads = vec![
            candidate_variants_from_read(&r1, &w, &filters),
            candidate_variants_from_read(&r2, &w, &filters),
        ];
        let records = records_from_samples(&[("s1".to_string(), reads, 2)], 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reference, "A");
        assert_eq!(records[0].alts, vec!["T".to_string()]);
        assert_eq!(records[0].sample_values[0][0], "1/1");
    }
}
