// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The YAML scenario file layered under the CLI: per-sample ploidy and the
//! soft filter thresholds that the `--config` flag points at.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::errors::Error;

#[derive(Debug, Deserialize, Clone, Getters)]
#[get = "pub"]
pub struct SampleConfig {
    /// Expected ploidy for this sample; defaults to 2 when omitted.
    #[serde(default = "default_ploidy")]
    ploidy: i64,
    #[serde(default)]
    group: Option<String>,
}

fn default_ploidy() -> i64 {
    2
}

#[derive(Debug, Deserialize, Clone, Getters)]
#[get = "pub"]
pub struct FilterThresholds {
    #[serde(default = "default_min_mapq")]
    min_mapq: u8,
    #[serde(default = "default_min_base_qual")]
    min_base_qual: u8,
    #[serde(default = "default_min_root_mean_square_mapq")]
    min_root_mean_square_mapq: f64,
    #[serde(default = "default_max_strand_bias")]
    max_strand_bias: f64,
}

fn default_min_mapq() -> u8 {
    20
}
fn default_min_base_qual() -> u8 {
    10
}
fn default_min_root_mean_square_mapq() -> f64 {
    40.0
}
fn default_max_strand_bias() -> f64 {
    0.01
}

impl Default for FilterThresholds {
    fn default() -> Self {
        FilterThresholds {
            min_mapq: default_min_mapq(),
            min_base_qual: default_min_base_qual(),
            min_root_mean_square_mapq: default_min_root_mean_square_mapq(),
            max_strand_bias: default_max_strand_bias(),
        }
    }
}

/// The deserialized `--config` scenario file: per-sample ploidy plus the
/// filter thresholds applied to every candidate record.
#[derive(Debug, Deserialize, Clone, Getters)]
#[get = "pub"]
pub struct Scenario {
    #[serde(default)]
    samples: HashMap<String, SampleConfig>,
    #[serde(default)]
    filters: FilterThresholds,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| Error::MissingConfigField {
            path: path.to_path_buf(),
            field: "(file not found)".to_string(),
        })?;
        serde_yaml::from_reader(file).map_err(|e| Error::MissingConfigField {
            path: path.to_path_buf(),
            field: e.to_string(),
        })
    }

    pub fn ploidy_for(&self, sample: &str) -> i64 {
        self.samples.get(sample).map(|s| *s.ploidy()).unwrap_or_else(default_ploidy)
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            samples: HashMap::new(),
            filters: FilterThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_documented_defaults() {
        let yaml = "samples:\n  tumor: {}\nfilters: {}\n";
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.ploidy_for("tumor"), 2);
        assert_eq!(*scenario.filters().min_mapq(), 20);
    }

    #[test]
    fn unconfigured_sample_defaults_to_diploid() {
        let scenario = Scenario::default();
        assert_eq!(scenario.ploidy_for("unknown"), 2);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = "samples:\n  tumor:\n    ploidy: 3\nfilters:\n  min_mapq: 30\n";
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.ploidy_for("tumor"), 3);
        assert_eq!(*scenario.filters().min_mapq(), 30);
    }
}
