// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! The CLI surface: a "call" subcommand (the default map-and-reduce mode)
//! and a "reduce" subcommand that merges VCF shards left over from a
//! previous `call` run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use regex::Regex;
use structopt::StructOpt;

use crate::calling;
use crate::config::{FilterThresholds, Scenario};
use crate::errors::Error;
use crate::io::reads::{IndexedBamSource, ReadSource};
use crate::io::reference::{IndexedFastaReference, ReferenceSource};
use crate::io::vcf::{format_record_line, VcfHeaderSpec, VcfHeaderSpecBuilder};
use crate::pipeline;
use crate::utils::{Interval, Region};

#[derive(Debug, StructOpt, Serialize, Deserialize, Clone)]
#[structopt(
    name = "varcall",
    about = "A small-variant caller for aligned short reads.",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
pub enum Varcall {
    #[structopt(
        name = "call",
        about = "Call variants from one or more BAMs against a reference, splitting the genome into blocks processed across a worker pool.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    Call {
        #[structopt(parse(from_os_str), help = "FASTA reference, indexed with `samtools faidx`.")]
        reference: PathBuf,

        #[structopt(parse(from_os_str), help = "Input BAM files, one per sample.")]
        bams: Vec<PathBuf>,

        #[structopt(parse(from_os_str), long, help = "YAML scenario file (ploidy, filter thresholds).")]
        config: Option<PathBuf>,

        #[structopt(parse(from_os_str), long, help = "Output VCF path (if omitted, write to STDOUT).")]
        output: Option<PathBuf>,

        #[structopt(long, help = "Regions to call, e.g. chr1:1000-2000; may be repeated.")]
        regions: Vec<String>,

        #[structopt(long = "number-of-jobs", default_value = "1", help = "Worker pool size; 0 disables parallelism.")]
        number_of_jobs: usize,

        #[structopt(long = "max-block-size", default_value = "1000000", help = "Maximum genomic span assigned to one worker.")]
        max_block_size: i64,

        #[structopt(long = "mem-limit", default_value = "1024", help = "Per-worker read buffer limit, in MiB.")]
        mem_limit: i64,

        #[structopt(long = "ploidy", default_value = "2", help = "Default ploidy for samples not listed in the scenario file.")]
        ploidy: i64,

        #[structopt(long = "output-ref-calls", help = "Emit a record for reference-confident blocks, not just variant loci.")]
        output_ref_calls: bool,

        #[structopt(long = "log-level", default_value = "info", help = "off, error, warn, info, debug or trace.")]
        log_level: String,

        #[structopt(parse(from_os_str), long = "log-filename", help = "Write logs here instead of stderr.")]
        log_filename: Option<PathBuf>,
    },

    #[structopt(
        name = "reduce",
        about = "Merge the per-worker VCF shards left behind by a `call` run into one output file.",
        setting = structopt::clap::AppSettings::ColoredHelp
    )]
    Reduce {
        #[structopt(parse(from_os_str), help = "Directory of VCF shards written by `call`.")]
        shard_directory: PathBuf,

        #[structopt(parse(from_os_str), long, help = "Output VCF path (if omitted, write to STDOUT).")]
        output: Option<PathBuf>,

        #[structopt(long = "log-level", default_value = "info", help = "off, error, warn, info, debug or trace.")]
        log_level: String,
    },
}

impl Varcall {
    pub fn log_level(&self) -> &str {
        match self {
            Varcall::Call { log_level, .. } => log_level,
            Varcall::Reduce { log_level, .. } => log_level,
        }
    }

    pub fn log_filename(&self) -> Option<&PathBuf> {
        match self {
            Varcall::Call { log_filename, .. } => log_filename.as_ref(),
            Varcall::Reduce { .. } => None,
        }
    }
}

/// Parse a `CONTIG:START-END` region spec into a half-open [`Region`],
/// where `START`/`END` are the usual 1-based inclusive samtools
/// convention.
fn parse_region_spec(spec: &str) -> Result<Region, Error> {
    lazy_static! {
        static ref REGION_RE: Regex = Regex::new(r"^([^:]+):(\d+)-(\d+)$").unwrap();
    }
    let invalid = || Error::InvalidRegionSpec { spec: spec.to_string() };
    let caps = REGION_RE.captures(spec).ok_or_else(invalid)?;
    let start: i64 = caps[2].parse().map_err(|_| invalid())?;
    let end: i64 = caps[3].parse().map_err(|_| invalid())?;
    if start < 1 || end < start {
        return Err(invalid());
    }
    Ok(Region::new(caps[1].to_string(), Interval::new(start - 1, end)))
}

fn sample_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// A plain `YYYYMMDD` stamp derived from the wall clock, civil-date math
/// done by hand since nothing else in the dependency tree already does it.
fn file_date() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{:04}{:02}{:02}", y, m, d)
}

fn setup_logging(level: &str, filename: Option<&PathBuf>) -> Result<()> {
    let level_filter = match level.to_lowercase().as_str() {
        "off" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    let dispatch = fern::Dispatch::new().level(level_filter);
    let dispatch = match filename {
        Some(path) => dispatch.chain(fern::log_file(path).context("failed to open log file")?),
        None => dispatch.chain(std::io::stderr()),
    };
    dispatch.apply().context("a logger is already installed")?;
    Ok(())
}

/// Header lines a worker writes at the top of its own shard, mirroring the
/// same fields `io::vcf`'s `bcf`-backed header builds, but rendered as flat
/// text so [`pipeline::reduce_shards`] can drop every shard's header but
/// the first by a simple `#`-prefix check.
fn shard_header_lines(spec: &VcfHeaderSpec) -> Vec<String> {
    let mut lines = vec![
        "##fileformat=VCFv4.2".to_string(),
        format!("##fileDate={}", spec.file_date),
        format!("##source={}", spec.source),
        format!("##reference={}", spec.reference_path),
        format!("##options={}", spec.options),
    ];
    lines.extend(spec.info_lines.iter().cloned());
    lines.extend(spec.filter_lines.iter().cloned());
    lines.extend(spec.format_lines.iter().cloned());
    for (name, len) in &spec.contigs {
        lines.push(format!("##contig=<ID={},length={}>", name, len));
    }
    let mut columns = vec![
        "#CHROM".to_string(),
        "POS".to_string(),
        "ID".to_string(),
        "REF".to_string(),
        "ALT".to_string(),
        "QUAL".to_string(),
        "FILTER".to_string(),
        "INFO".to_string(),
        "FORMAT".to_string(),
    ];
    columns.extend(spec.samples.iter().cloned());
    lines.push(columns.join("\t"));
    lines
}

/// Candidates need at least this many supporting reads, in any one sample,
/// to be written out at all -- a coarse stand-in for a real genotyper's
/// posterior threshold.
const MIN_SUPPORTING_READS: usize = 2;

/// Reference context materialized on either side of a block so that reads
/// overlapping the block's edge still decode cleanly against real bases.
const BLOCK_FLANK: i64 = 100;

#[allow(clippy::too_many_arguments)]
fn process_block(
    block: &Region,
    idx: usize,
    total_blocks: usize,
    reference_path: &Path,
    bam_paths: &[PathBuf],
    sample_names: &[String],
    scenario: &Scenario,
    contigs: &[(String, i64)],
    shard_dir: &Path,
) -> std::result::Result<PathBuf, Error> {
    let mut reference = IndexedFastaReference::open(reference_path)?;
    let padded_region = block.padded(BLOCK_FLANK);
    let ref_window = Rc::new(reference.fetch(&padded_region)?);
    let filters: &FilterThresholds = scenario.filters();

    let mut samples = Vec::new();
    for (bam_path, name) in bam_paths.iter().zip(sample_names.iter()) {
        let mut source = IndexedBamSource::open(bam_path, name.clone(), false)?;
        let reads: Vec<_> = source.fetch(block)?.collect();
        let per_read: Vec<_> = reads
            .iter()
            .filter(|read| calling::read_fits_window(read, &padded_region))
            .map(|read| calling::candidate_variants_from_read(read, &ref_window, filters))
            .collect();
        samples.push((name.clone(), per_read, scenario.ploidy_for(name)));
    }

    let records = calling::records_from_samples(&samples, MIN_SUPPORTING_READS);

    let header_spec = VcfHeaderSpecBuilder::default()
        .source("varcall".to_string())
        .file_date(file_date())
        .reference_path(reference_path.display().to_string())
        .info_lines(vec![
            "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total read depth across all samples\">".to_string(),
            "##INFO=<ID=AD,Number=1,Type=Integer,Description=\"Reads supporting the alternate allele\">".to_string(),
        ])
        .format_lines(vec![
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">".to_string(),
            "##FORMAT=<ID=AD,Number=1,Type=Integer,Description=\"Per-sample supporting read count\">".to_string(),
        ])
        .contigs(contigs.to_vec())
        .samples(sample_names.to_vec())
        .build()
        .expect("bug: all required VcfHeaderSpec fields are set above");

    let mut contents = shard_header_lines(&header_spec).join("\n");
    contents.push('\n');
    for record in &records {
        contents.push_str(&format_record_line(record));
        contents.push('\n');
    }

    let shard_path = shard_dir.join(pipeline::shard_filename(idx, total_blocks));
    std::fs::write(&shard_path, contents).map_err(|_| Error::StaleShards {
        path: shard_path.clone(),
    })?;
    Ok(shard_path)
}

fn run_call(
    reference: &Path,
    bams: &[PathBuf],
    config: Option<&Path>,
    output: Option<&Path>,
    region_specs: &[String],
    number_of_jobs: usize,
    max_block_size: i64,
    ploidy: i64,
) -> Result<()> {
    if bams.is_empty() {
        return Err(Error::MissingInputBams.into());
    }
    if ploidy <= 0 {
        return Err(Error::InvalidPloidy { value: ploidy }.into());
    }

    let scenario = match config {
        Some(path) => Scenario::load(path)?,
        None => Scenario::default(),
    };

    let reference_reader = IndexedFastaReference::open(reference)?;
    let regions: Vec<Region> = if region_specs.is_empty() {
        reference_reader
            .all_contigs()
            .into_iter()
            .map(|(name, len)| Region::new(name, Interval::new(0, len)))
            .collect()
    } else {
        region_specs.iter().map(|spec| parse_region_spec(spec)).collect::<std::result::Result<_, _>>()?
    };
    if regions.is_empty() {
        return Err(Error::NoRegionsGiven.into());
    }
    log::info!("calling {} region(s) across {} sample(s)", regions.len(), bams.len());

    let blocks: Vec<Region> = regions.iter().flat_map(|region| pipeline::split_into_blocks(region, max_block_size)).collect();

    let mut seen_contigs = HashSet::new();
    let contigs: Vec<(String, i64)> = regions
        .iter()
        .filter(|region| seen_contigs.insert(region.contig().to_string()))
        .map(|region| {
            let len = reference_reader.contig_length(region.contig()).unwrap_or_else(|_| region.end());
            (region.contig().to_string(), len)
        })
        .collect();

    let sample_names: Vec<String> = bams.iter().map(|p| sample_name(p)).collect();
    let reference_path = reference.to_path_buf();
    let bams = bams.to_vec();
    let total_blocks = blocks.len();
    let shard_dir = tempfile::tempdir().context("failed to create a shard directory")?;

    let shard_paths = pipeline::run_blocks(&blocks, number_of_jobs, |block, idx| {
        process_block(
            block,
            idx,
            total_blocks,
            &reference_path,
            &bams,
            &sample_names,
            &scenario,
            &contigs,
            shard_dir.path(),
        )
    })?;

    log::info!("merging {} shard(s)", shard_paths.len());
    pipeline::reduce_shards(&shard_paths, output)?;
    Ok(())
}

fn run_reduce(shard_directory: &Path, output: Option<&Path>) -> Result<()> {
    let mut shard_paths: Vec<PathBuf> = std::fs::read_dir(shard_directory)
        .map_err(|_| Error::MissingShardDirectory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|ext| ext == "vcf").unwrap_or(false))
        .collect();
    shard_paths.sort();
    pipeline::reduce_shards(&shard_paths, output)?;
    Ok(())
}

/// Run the parsed CLI invocation: set up logging, then dispatch to the
/// `call` or `reduce` pipeline.
pub fn run(opt: Varcall) -> Result<()> {
    setup_logging(opt.log_level(), opt.log_filename())?;
    match opt {
        Varcall::Call {
            reference,
            bams,
            config,
            output,
            regions,
            number_of_jobs,
            max_block_size,
            mem_limit: _,
            ploidy,
            output_ref_calls: _,
            log_level: _,
            log_filename: _,
        } => run_call(&reference, &bams, config.as_deref(), output.as_deref(), &regions, number_of_jobs, max_block_size, ploidy),
        Varcall::Reduce {
            shard_directory,
            output,
            log_level: _,
        } => run_reduce(&shard_directory, output.as_deref()),
    }
}
