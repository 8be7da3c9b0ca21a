// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The banded pair-HMM / Needleman-Wunsch aligner and its per-position
//! gap-open penalty model.

pub mod gap_model;
pub mod pairhmm;

pub use gap_model::compute_gap_open;
pub use pairhmm::{align, AlignmentResult, Traceback};
