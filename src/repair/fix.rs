use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    time::Instant,
};
use tracing::{info, warn};

use crate::repair::{fixers::FixerRegistry, strip_line_terminators};

#[derive(Debug, Default)]
pub struct FixReport {
    /// Data rows written to the output (the header is not counted).
    pub data_rows: u64,
    /// Rows whose field count did not match the header.
    pub mismatched_rows: u64,
}

/// Normalize every data row against the header schema.
///
/// The first line names the columns and is reproduced verbatim. Each
/// remaining line is split on tab, mapped positionally onto the column
/// names, and run through the registry. A row whose field count differs
/// from the header is reported and normalized to the header width: short
/// rows are padded with empty fields, long rows truncated, so every output
/// row keeps a stable column count.
pub fn fix_records<R, W>(mut reader: R, mut writer: W, registry: &FixerRegistry) -> Result<FixReport>
where
    R: BufRead,
    W: Write,
{
    let mut header = String::new();
    let bytes_read = reader
        .read_line(&mut header)
        .context("reading header line")?;
    if bytes_read == 0 {
        bail!("input file is empty, expected a tab-delimited header line");
    }
    let header = strip_line_terminators(&header);
    let columns: Vec<String> = header.split('\t').map(str::to_string).collect();
    writeln!(writer, "{}", header)?;

    let mut report = FixReport::default();
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).context("reading input line")?;
        if bytes_read == 0 {
            break;
        }
        // Header is line 1.
        let line_no = report.data_rows + 2;

        let mut fields: Vec<String> = strip_line_terminators(&line)
            .split('\t')
            .map(str::to_string)
            .collect();

        if fields.len() != columns.len() {
            report.mismatched_rows += 1;
            warn!(
                line = line_no,
                fields = fields.len(),
                columns = columns.len(),
                "field count does not match header, normalizing row to header width"
            );
            fields.resize(columns.len(), String::new());
        }

        let fixed: Vec<String> = columns
            .iter()
            .zip(&fields)
            .map(|(column, raw)| registry.fix(column, raw))
            .collect();
        writeln!(writer, "{}", fixed.join("\t"))?;
        report.data_rows += 1;
    }

    Ok(report)
}

/// Path-based wrapper around [`fix_records`]. Both file handles are scoped
/// to this call and released on every exit path.
pub fn fix_file<P, Q>(input: P, output: Q, registry: &FixerRegistry) -> Result<FixReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input = input.as_ref();
    let output = output.as_ref();
    let start = Instant::now();

    let reader = BufReader::new(
        File::open(input).with_context(|| format!("failed to open input {}", input.display()))?,
    );
    let mut writer = BufWriter::new(
        File::create(output)
            .with_context(|| format!("failed to create output {}", output.display()))?,
    );

    let report = fix_records(reader, &mut writer, registry)?;
    writer
        .flush()
        .with_context(|| format!("failed to flush output {}", output.display()))?;

    info!(
        data_rows = report.data_rows,
        mismatched_rows = report.mismatched_rows,
        elapsed = ?start.elapsed(),
        "fixed {}",
        input.display()
    );
    Ok(report)
}
