// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The atomic variant: a region on a reference window plus a replacement
//! (`alt`) sequence. Deletions have an empty `alt`; insertions have an
//! empty region; everything else falls out of comparing the two lengths.

use std::cmp::Ordering;
use std::rc::Rc;

use strum_macros::{Display, EnumString};

use crate::utils::{BasePairSequence, Region, ReferenceWindow};

/// How an [`AtomicVariant`] is reported, e.g. in a VCF `INFO` tag or a
/// `--omit-*` filter flag; `Display`/`EnumString` round-trip through the
/// same abbreviated spellings VCF tooling expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum Classification {
    #[strum(serialize = "SNP")]
    Snp,
    #[strum(serialize = "INS")]
    Insertion,
    #[strum(serialize = "DEL")]
    Deletion,
    #[strum(serialize = "MNP")]
    Mnp,
    #[strum(serialize = "COMPLEX")]
    Complex,
}

/// A single candidate edit against a reference window: replace `region`
/// with `alt`. Two variants compare equal by their (reference subsequence,
/// alt) pair, irrespective of which reference window backs them; they
/// order by contig, then start, with pure insertions sorting first among
/// variants sharing a start, then by end, length and finally lexically by
/// `alt`.
#[derive(Clone, Debug)]
pub struct AtomicVariant {
    ref_window: Rc<ReferenceWindow>,
    region: Region,
    alt: BasePairSequence,
    fully_left_aligned: bool,
    from_breakpoint: bool,
    prior: f64,
}

impl AtomicVariant {
    pub fn new(
        ref_window: Rc<ReferenceWindow>,
        region: Region,
        alt: BasePairSequence,
        fully_left_aligned: bool,
        from_breakpoint: bool,
    ) -> Self {
        assert!(
            ref_window.region().contains(&region),
            "bug: variant region not contained in its reference window"
        );
        let prior = default_prior(&ref_window, &region, &alt);
        AtomicVariant {
            ref_window,
            region,
            alt,
            fully_left_aligned,
            from_breakpoint,
            prior,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn alt(&self) -> &BasePairSequence {
        &self.alt
    }

    pub fn fully_left_aligned(&self) -> bool {
        self.fully_left_aligned
    }

    pub fn from_breakpoint(&self) -> bool {
        self.from_breakpoint
    }

    pub fn prior(&self) -> f64 {
        self.prior
    }

    pub fn ref_subsequence(&self) -> BasePairSequence {
        self.ref_window.sub_window(&self.region).sequence().clone()
    }

    pub fn ref_len(&self) -> usize {
        self.region.interval().size() as usize
    }

    pub fn alt_len(&self) -> usize {
        self.alt.len()
    }

    pub fn is_snp(&self) -> bool {
        self.ref_len() == 1 && self.alt_len() == 1
    }

    pub fn is_insertion(&self) -> bool {
        self.ref_len() == 0
    }

    pub fn is_deletion(&self) -> bool {
        self.alt_len() == 0
    }

    pub fn is_pure_indel(&self) -> bool {
        self.is_insertion() != self.is_deletion() && (self.ref_len() == 0 || self.alt_len() == 0)
    }

    pub fn is_mnp(&self) -> bool {
        self.ref_len() == self.alt_len()
            && self.ref_len() > 1
            && self
                .ref_subsequence()
                .iter()
                .zip(self.alt.iter())
                .all(|(r, a)| r != a)
    }

    pub fn classification(&self) -> Classification {
        if self.is_snp() {
            Classification::Snp
        } else if self.is_insertion() {
            Classification::Insertion
        } else if self.is_deletion() {
            Classification::Deletion
        } else if self.is_mnp() {
            Classification::Mnp
        } else {
            Classification::Complex
        }
    }

    fn ref_base_at(&self, pos: i64) -> u8 {
        self.ref_window
            .sequence()
            .base((pos - self.ref_window.region().start()) as usize)
    }

    /// Slide a pure indel as far left as the repeated/ambiguous context
    /// around it allows, never past `floor`. Clears
    /// [`AtomicVariant::fully_left_aligned`] if the slide had to stop
    /// because it hit `floor`, rather than because the context diverged --
    /// in that case a wider reference window is needed to know the true
    /// left-most representation.
    pub fn left_align(&self, floor: i64) -> Self {
        if !self.is_pure_indel() {
            return self.clone();
        }
        let mut start = self.region.start();
        let mut end = self.region.end();
        let mut alt = self.alt.clone();
        let insertion = self.is_insertion();
        let mut hit_floor = false;
        loop {
            if start - 1 < floor {
                hit_floor = true;
                break;
            }
            let prev_base = self.ref_base_at(start - 1);
            let moving_base = if insertion {
                alt.base(alt.len() - 1)
            } else {
                self.ref_base_at(end - 1)
            };
            if prev_base != moving_base {
                break;
            }
            start -= 1;
            end -= 1;
            if insertion {
                alt = BasePairSequence::new(vec![prev_base]).concat(&alt.substring(0, alt.len() as i64 - 1));
            }
        }
        let region = Region::new(self.region.contig(), crate::utils::Interval::new(start, end));
        let mut out = AtomicVariant::new(
            self.ref_window.clone(),
            region,
            alt,
            !hit_floor,
            self.from_breakpoint,
        );
        out.prior = self.prior;
        out
    }

    /// The mirror image of [`AtomicVariant::left_align`]: slide right,
    /// never past `ceiling`.
    pub fn right_align(&self, ceiling: i64) -> Self {
        if !self.is_pure_indel() {
            return self.clone();
        }
        let mut start = self.region.start();
        let mut end = self.region.end();
        let mut alt = self.alt.clone();
        let insertion = self.is_insertion();
        loop {
            if end >= ceiling {
                break;
            }
            let next_base = self.ref_base_at(end);
            let moving_base = if insertion {
                alt.base(0)
            } else {
                self.ref_base_at(start)
            };
            if next_base != moving_base {
                break;
            }
            start += 1;
            end += 1;
            if insertion {
                alt = alt.substring(1, alt.len() as i64).concat(&BasePairSequence::new(vec![next_base]));
            }
        }
        let region = Region::new(self.region.contig(), crate::utils::Interval::new(start, end));
        let mut out = AtomicVariant::new(self.ref_window.clone(), region, alt, self.fully_left_aligned, self.from_breakpoint);
        out.prior = self.prior;
        out
    }

    /// The half-open range of genomic positions a pure indel could
    /// genuinely sit at, bounded by how far it can be slid left/right
    /// without running off the edges of the reference window.
    pub fn start_region(&self, floor: i64, ceiling: i64) -> crate::utils::Interval {
        let left = self.left_align(floor);
        let right = self.right_align(ceiling);
        crate::utils::Interval::new(left.region.start(), right.region.start())
    }

    pub fn end_region(&self, floor: i64, ceiling: i64) -> crate::utils::Interval {
        let left = self.left_align(floor);
        let right = self.right_align(ceiling);
        crate::utils::Interval::new(left.region.end(), right.region.end())
    }

    /// Strip the longest common suffix, then the longest common prefix,
    /// shared between the reference subsequence and `alt`.
    pub fn trim(&self) -> Self {
        let r = self.ref_subsequence();
        let r = r.as_bytes();
        let a = self.alt.as_bytes();

        let max_suffix = r.len().min(a.len());
        let mut suffix = 0;
        while suffix < max_suffix && r[r.len() - 1 - suffix] == a[a.len() - 1 - suffix] {
            suffix += 1;
        }

        let r_head = &r[..r.len() - suffix];
        let a_head = &a[..a.len() - suffix];
        let max_prefix = r_head.len().min(a_head.len());
        let mut prefix = 0;
        while prefix < max_prefix && r_head[prefix] == a_head[prefix] {
            prefix += 1;
        }

        let new_start = self.region.start() + prefix as i64;
        let new_end = self.region.end() - suffix as i64;
        let new_alt = BasePairSequence::new(a[prefix..a.len() - suffix].to_vec());
        let region = Region::new(self.region.contig(), crate::utils::Interval::new(new_start, new_end));
        AtomicVariant::new(
            self.ref_window.clone(),
            region,
            new_alt,
            self.fully_left_aligned,
            self.from_breakpoint,
        )
    }

    /// Decompose a variant whose ref/alt lengths differ, or whose equal
    /// lengths hide more than one substitution, into a minimal set of pure
    /// indels and SNPs. A no-op for already-atomic variants.
    pub fn split(&self) -> Vec<Self> {
        let ref_len = self.ref_len();
        let alt_len = self.alt_len();
        let contig = self.region.contig().to_string();

        if ref_len == alt_len {
            if ref_len == 0 {
                return Vec::new();
            }
            let ref_seq = self.ref_subsequence();
            let mut out = Vec::new();
            for i in 0..ref_len {
                let r = ref_seq.base(i);
                let a = self.alt.base(i);
                if r != a {
                    let pos = self.region.start() + i as i64;
                    let region = Region::new(contig.clone(), crate::utils::Interval::new(pos, pos + 1));
                    out.push(AtomicVariant::new(
                        self.ref_window.clone(),
                        region,
                        BasePairSequence::new(vec![a]),
                        self.fully_left_aligned,
                        self.from_breakpoint,
                    ));
                }
            }
            out
        } else if ref_len < alt_len {
            let extra = alt_len - ref_len;
            let head_region = Region::new(contig.clone(), crate::utils::Interval::new(self.region.start(), self.region.start()));
            let head = AtomicVariant::new(
                self.ref_window.clone(),
                head_region,
                self.alt.substring(0, extra as i64),
                self.fully_left_aligned,
                self.from_breakpoint,
            );
            let residual_alt = self.alt.substring(extra as i64, alt_len as i64);
            let residual = AtomicVariant::new(
                self.ref_window.clone(),
                self.region.clone(),
                residual_alt,
                self.fully_left_aligned,
                self.from_breakpoint,
            );
            let mut out = vec![head];
            out.extend(residual.split());
            out
        } else {
            let extra = ref_len - alt_len;
            let tail_start = self.region.end() - extra as i64;
            let tail_region = Region::new(contig.clone(), crate::utils::Interval::new(tail_start, self.region.end()));
            let tail = AtomicVariant::new(
                self.ref_window.clone(),
                tail_region,
                BasePairSequence::new(Vec::new()),
                self.fully_left_aligned,
                self.from_breakpoint,
            );
            let residual_region = Region::new(contig, crate::utils::Interval::new(self.region.start(), tail_start));
            let residual = AtomicVariant::new(
                self.ref_window.clone(),
                residual_region,
                self.alt.clone(),
                self.fully_left_aligned,
                self.from_breakpoint,
            );
            let mut out = residual.split();
            out.push(tail);
            out
        }
    }

    /// Concatenate two variants whose regions abut end-to-end on the same
    /// contig and reference window, trimming the result.
    pub fn join(&self, other: &Self) -> Option<Self> {
        if self.region.contig() != other.region.contig() {
            return None;
        }
        if self.region.end() != other.region.start() {
            return None;
        }
        if self.ref_window != other.ref_window {
            return None;
        }
        let region = Region::new(
            self.region.contig(),
            crate::utils::Interval::new(self.region.start(), other.region.end()),
        );
        let alt = self.alt.concat(&other.alt);
        let joined = AtomicVariant::new(
            self.ref_window.clone(),
            region,
            alt,
            false,
            self.from_breakpoint || other.from_breakpoint,
        );
        Some(joined.trim())
    }

    /// If `other`'s region is contained in `self`'s and its `alt` matches
    /// the corresponding head or tail of `self`'s `alt`, return `self` with
    /// that piece removed, trimmed.
    pub fn remove(&self, other: &Self) -> Option<Self> {
        if self.region.contig() != other.region.contig() {
            return None;
        }
        if !self.region.contains(&other.region) {
            return None;
        }
        let blen = other.alt_len();
        if self.alt_len() < blen {
            return None;
        }
        let contig = self.region.contig().to_string();
        if other.region.start() == self.region.start() {
            if self.alt.substring(0, blen as i64) != *other.alt() {
                return None;
            }
            let new_alt = self.alt.substring(blen as i64, self.alt_len() as i64);
            let region = Region::new(contig, crate::utils::Interval::new(other.region.end(), self.region.end()));
            Some(AtomicVariant::new(self.ref_window.clone(), region, new_alt, false, self.from_breakpoint).trim())
        } else if other.region.end() == self.region.end() {
            let tail_start = self.alt_len() - blen;
            if self.alt.substring(tail_start as i64, self.alt_len() as i64) != *other.alt() {
                return None;
            }
            let new_alt = self.alt.substring(0, tail_start as i64);
            let region = Region::new(contig, crate::utils::Interval::new(self.region.start(), other.region.start()));
            Some(AtomicVariant::new(self.ref_window.clone(), region, new_alt, false, self.from_breakpoint).trim())
        } else {
            None
        }
    }
}

fn default_prior(ref_window: &ReferenceWindow, region: &Region, alt: &BasePairSequence) -> f64 {
    let ref_len = region.interval().size() as usize;
    let alt_len = alt.len();
    if ref_len == 1 && alt_len == 1 {
        1e-3 / 3.0
    } else if ref_len == 0 {
        1e-4 * 0.33f64.powi(alt_len as i32)
    } else if alt_len == 0 {
        1e-4 * 0.8f64.powi(ref_len as i32)
    } else if ref_len == alt_len {
        let ref_seq = ref_window.sub_window(region);
        let d = ref_seq
            .sequence()
            .iter()
            .zip(alt.iter())
            .filter(|(r, a)| r != a)
            .count()
            .max(1);
        5e-5 * 0.1f64.powi(d as i32 - 1) * 0.9
    } else {
        f64::NAN
    }
}

impl PartialEq for AtomicVariant {
    fn eq(&self, other: &Self) -> bool {
        self.ref_subsequence() == other.ref_subsequence() && self.alt == other.alt
    }
}

impl Eq for AtomicVariant {}

impl PartialOrd for AtomicVariant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AtomicVariant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.region
            .contig()
            .cmp(other.region.contig())
            .then_with(|| self.region.start().cmp(&other.region.start()))
            .then_with(|| other.is_insertion().cmp(&self.is_insertion()))
            .then_with(|| self.region.end().cmp(&other.region.end()))
            .then_with(|| self.alt_len().cmp(&other.alt_len()))
            .then_with(|| self.alt.cmp(&other.alt))
    }
}
