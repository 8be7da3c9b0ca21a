// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;

use crate::utils::interval::Interval;
use crate::utils::sequence::{BasePairSequence, GAP};

/// A contig name plus a half-open interval on it. Regions on different
/// contigs are incomparable; operations that mix contigs are a caller bug
/// and assert rather than return an error.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    contig: String,
    interval: Interval,
}

impl Region {
    pub fn new(contig: impl Into<String>, interval: Interval) -> Self {
        Region {
            contig: contig.into(),
            interval,
        }
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn start(&self) -> i64 {
        self.interval.start()
    }

    pub fn end(&self) -> i64 {
        self.interval.end()
    }

    fn assert_same_contig(&self, other: &Region) {
        assert_eq!(
            self.contig, other.contig,
            "bug: region operation given regions on different contigs ({} vs {})",
            self.contig, other.contig
        );
    }

    pub fn contains(&self, other: &Region) -> bool {
        self.assert_same_contig(other);
        self.interval.contains_interval(&other.interval)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.assert_same_contig(other);
        self.interval.overlaps(&other.interval)
    }

    pub fn combine(&self, other: &Region) -> Region {
        self.assert_same_contig(other);
        Region {
            contig: self.contig.clone(),
            interval: self.interval.combine(&other.interval),
        }
    }

    pub fn padded(&self, amount: i64) -> Region {
        Region {
            contig: self.contig.clone(),
            interval: self.interval.pad(amount),
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contig, self.interval)
    }
}

/// A region plus a base-pair sequence whose length equals the region's
/// size; enforced at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceWindow {
    region: Region,
    sequence: BasePairSequence,
}

impl ReferenceWindow {
    pub fn new(region: Region, sequence: BasePairSequence) -> Self {
        assert_eq!(
            sequence.len() as i64,
            region.interval().size(),
            "bug: reference window sequence length does not match region size"
        );
        ReferenceWindow { region, sequence }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn sequence(&self) -> &BasePairSequence {
        &self.sequence
    }

    /// Extract a sub-window over a region contained in this window.
    pub fn sub_window(&self, sub_region: &Region) -> ReferenceWindow {
        assert!(
            self.region.contains(sub_region),
            "bug: sub-window region {:?} not contained in {:?}",
            sub_region,
            self.region
        );
        let offset = sub_region.start() - self.region.start();
        let len = sub_region.interval().size();
        ReferenceWindow {
            region: sub_region.clone(),
            sequence: self.sequence.substring(offset, offset + len),
        }
    }

    /// A wider window containing this one, with left/right flanks
    /// materialized as the gap character.
    pub fn padded_window(&self, wider_region: &Region) -> ReferenceWindow {
        assert!(
            wider_region.contains(&self.region),
            "bug: padded window region {:?} does not contain {:?}",
            wider_region,
            self.region
        );
        let left_pad = (self.region.start() - wider_region.start()) as usize;
        let right_pad = (wider_region.end() - self.region.end()) as usize;
        let sequence = BasePairSequence::filled_with_gap(left_pad)
            .concat(&self.sequence)
            .concat(&BasePairSequence::filled_with_gap(right_pad));
        ReferenceWindow {
            region: wider_region.clone(),
            sequence,
        }
    }

    /// Forward iterator over bases in `sub_interval`, expressed relative to
    /// this window's region. `sub_interval` need not lie entirely inside the
    /// window: out-of-window positions are materialized as `N`.
    pub fn iter_forward(&self, sub_interval: Interval) -> impl Iterator<Item = u8> + '_ {
        self.padded_range(sub_interval).into_iter()
    }

    pub fn iter_reverse(&self, sub_interval: Interval) -> impl Iterator<Item = u8> {
        let mut v = self.padded_range(sub_interval);
        v.reverse();
        v.into_iter()
    }

    fn padded_range(&self, sub_interval: Interval) -> Vec<u8> {
        (sub_interval.start()..sub_interval.end())
            .map(|pos| {
                if self.region.interval().contains_point(pos) {
                    self.sequence.base((pos - self.region.start()) as usize)
                } else {
                    GAP
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> ReferenceWindow {
        ReferenceWindow::new(
            Region::new("chr1", Interval::new(100, 110)),
            BasePairSequence::from_str_unchecked("ACGTACGTAC"),
        )
    }

    #[test]
    fn sub_window_extracts_substring() {
        let w = window();
        let sub = w.sub_window(&Region::new("chr1", Interval::new(102, 105)));
        assert_eq!(sub.sequence().to_string(), "GTA");
    }

    #[test]
    fn padded_window_fills_flanks_with_gap() {
        let w = window();
        let padded = w.padded_window(&Region::new("chr1", Interval::new(95, 115)));
        assert_eq!(padded.sequence().to_string(), "NNNNNACGTACGTACNNNNN");
    }

    #[test]
    fn iter_forward_pads_out_of_window_positions() {
        let w = window();
        let bases: String = w
            .iter_forward(Interval::new(98, 103))
            .map(|b| b as char)
            .collect();
        assert_eq!(bases, "NNACG");
    }

    #[test]
    #[should_panic(expected = "bug:")]
    fn sub_window_panics_when_not_contained() {
        let w = window();
        w.sub_window(&Region::new("chr1", Interval::new(50, 60)));
    }
}
