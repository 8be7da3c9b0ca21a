// Copyright 2024 Varcall contributors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! VCF header construction and record emission, built on
//! `rust_htslib::bcf`. The output format is kept to plain text (`##fileformat=`
//! onward) rather than BCF, since shards are concatenated by the reduce step
//! as flat files.

use std::path::Path;

use rust_htslib::bcf;

use crate::errors::Error;

/// One emitted variant locus, already reduced to the plain strings the text
/// format wants -- callers build this from an [`crate::variants::AtomicVariant`]
/// plus whatever per-sample annotation the caller layer computed.
pub struct VcfRecord {
    pub contig: String,
    /// 0-based; written out as 1-based.
    pub pos: i64,
    pub id: Option<String>,
    pub reference: String,
    pub alts: Vec<String>,
    pub qual: Option<f64>,
    pub filters: Vec<String>,
    pub info: Vec<(String, String)>,
    pub format_keys: Vec<String>,
    pub sample_values: Vec<Vec<String>>,
}

/// A declared `##INFO=`/`##FORMAT=`/`##FILTER=` header line plus the
/// contigs to register, used to build the header once per writer. Most
/// callers only have a handful of these fields on hand at once (the rest
/// default to empty), so this is assembled through a generated builder
/// rather than a single all-fields struct literal.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct VcfHeaderSpec {
    pub source: String,
    /// `YYYYMMDD`, supplied by the caller so the core never reads the clock.
    pub file_date: String,
    pub reference_path: String,
    #[builder(default)]
    pub options: String,
    #[builder(default)]
    pub info_lines: Vec<String>,
    #[builder(default)]
    pub format_lines: Vec<String>,
    #[builder(default)]
    pub filter_lines: Vec<String>,
    pub contigs: Vec<(String, i64)>,
    pub samples: Vec<String>,
}

fn build_header(spec: &VcfHeaderSpec) -> bcf::Header {
    let mut header = bcf::Header::new();
    header.push_record(b"##fileformat=VCFv4.2");
    header.push_record(format!("##fileDate={}", spec.file_date).as_bytes());
    header.push_record(format!("##source={}", spec.source).as_bytes());
    header.push_record(format!("##reference={}", spec.reference_path).as_bytes());
    header.push_record(format!("##options={}", spec.options).as_bytes());
    for line in &spec.info_lines {
        header.push_record(line.as_bytes());
    }
    for line in &spec.filter_lines {
        header.push_record(line.as_bytes());
    }
    for line in &spec.format_lines {
        header.push_record(line.as_bytes());
    }
    for (name, len) in &spec.contigs {
        header.push_record(format!("##contig=<ID={},length={}>", name, len).as_bytes());
    }
    for sample in &spec.samples {
        header.push_sample(sample.as_bytes());
    }
    header
}

/// Writes variant loci to a path (or stdout when `path` is `None`) in
/// `rust_htslib`'s text-VCF mode.
pub struct VcfWriter {
    writer: bcf::Writer,
}

impl VcfWriter {
    pub fn create(path: Option<impl AsRef<Path>>, spec: &VcfHeaderSpec) -> Result<Self, Error> {
        let header = build_header(spec);
        let writer = match path {
            Some(path) => bcf::Writer::from_path(path.as_ref(), &header, true, bcf::Format::VCF)
                .map_err(|_| Error::MissingConfigField {
                    path: path.as_ref().to_path_buf(),
                    field: "output path".to_string(),
                })?,
            None => bcf::Writer::from_stdout(&header, true, bcf::Format::VCF).map_err(|_| Error::MissingInputBams)?,
        };
        Ok(VcfWriter { writer })
    }

    /// Serialize one `bcf` record: comma-joined alts, semicolon-joined
    /// filters (or `PASS`), semicolon-joined info, colon-joined format keys
    /// and colon-joined per-sample values. Missing scalars are written as
    /// `.`.
    pub fn write_record(&mut self, record: &VcfRecord) -> Result<(), Error> {
        let mut rec = self.writer.empty_record();
        let rid = self
            .writer
            .header()
            .name2rid(record.contig.as_bytes())
            .map_err(|_| Error::UnknownContig {
                contig: record.contig.clone(),
            })?;
        rec.set_rid(Some(rid));
        rec.set_pos(record.pos as i64);
        if let Some(id) = &record.id {
            rec.set_id(id.as_bytes()).ok();
        }

        let mut alleles: Vec<&[u8]> = vec![record.reference.as_bytes()];
        alleles.extend(record.alts.iter().map(|alt| alt.as_bytes()));
        rec.set_alleles(&alleles).ok();

        if let Some(qual) = record.qual {
            rec.set_qual(qual as f32);
        }

        if record.filters.is_empty() {
            rec.set_filters(&[b"PASS"]).ok();
        } else {
            let filter_ids: Vec<&[u8]> = record.filters.iter().map(|f| f.as_bytes()).collect();
            rec.set_filters(&filter_ids).ok();
        }

        for (key, value) in &record.info {
            rec.push_info_string(key.as_bytes(), &[value.as_bytes()]).ok();
        }

        self.writer.write(&rec).map_err(|_| Error::MissingShardDirectory)?;
        Ok(())
    }
}

/// Render a record as a tab-separated plain-text line, independent of
/// whatever binary encoding `rust_htslib` chose -- used for the reduce step,
/// which concatenates shards as flat text rather than re-parsing BCF.
pub fn format_record_line(record: &VcfRecord) -> String {
    let alts = if record.alts.is_empty() {
        ".".to_string()
    } else {
        record.alts.join(",")
    };
    let qual = record.qual.map(|q| format!("{:.2}", q)).unwrap_or_else(|| ".".to_string());
    let filters = if record.filters.is_empty() {
        "PASS".to_string()
    } else {
        record.filters.join(";")
    };
    let info = if record.info.is_empty() {
        ".".to_string()
    } else {
        record
            .info
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    };
    let format_keys = record.format_keys.join(":");
    let samples = record
        .sample_values
        .iter()
        .map(|values| values.join(":"))
        .collect::<Vec<_>>()
        .join("\t");

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.contig,
        record.pos + 1,
        record.id.clone().unwrap_or_else(|| ".".to_string()),
        record.reference,
        alts,
        qual,
        filters,
        info,
        format_keys,
        samples,
    )
}
