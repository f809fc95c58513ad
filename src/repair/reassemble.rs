use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    time::Instant,
};
use tracing::{debug, info};

use crate::repair::{sds_record_start, strip_line_terminators, HEADER_MARKER};

/// Knobs for a reassembly pass.
pub struct ReassembleOptions<F = fn(&str) -> bool>
where
    F: Fn(&str) -> bool,
{
    /// Returns true when a line's first field begins a new logical record.
    pub starts_record: F,
    /// Tally how many physical lines had each field count, for manual
    /// inspection of a corrupted export. Off by default.
    pub tally_field_counts: bool,
}

impl Default for ReassembleOptions {
    fn default() -> Self {
        Self {
            starts_record: sds_record_start,
            tally_field_counts: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReassembleReport {
    /// Physical lines read from the input.
    pub physical_lines: u64,
    /// Lines classified as the start of a logical record.
    pub records: u64,
    /// Field-count histogram, populated only when the tally is enabled.
    pub field_count_tally: Option<HashMap<usize, u64>>,
}

/// Re-emit one physical line per logical record.
///
/// The corrupted export breaks logical records across physical lines. Each
/// input line is stripped of its terminators and classified by its first
/// field: the `FILE` header opens the output, a line matching
/// `starts_record` terminates the previous record and starts a new one, and
/// anything else is continuation data appended to the current record. No
/// schema validation happens here; malformed fields come out
/// newline-normalized but otherwise untouched.
pub fn reassemble_records<R, W, F>(
    mut reader: R,
    mut writer: W,
    options: &ReassembleOptions<F>,
) -> Result<ReassembleReport>
where
    R: BufRead,
    W: Write,
    F: Fn(&str) -> bool,
{
    let mut report = ReassembleReport::default();
    let mut tally: HashMap<usize, u64> = HashMap::new();

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).context("reading input line")?;
        if bytes_read == 0 {
            break;
        }
        report.physical_lines += 1;

        let fields: Vec<&str> = strip_line_terminators(&line).split('\t').collect();
        if options.tally_field_counts {
            *tally.entry(fields.len()).or_insert(0) += 1;
        }

        if fields[0] == HEADER_MARKER {
            // Header opens the file; there is no record to terminate yet.
            write!(writer, "{}", fields.join("\t"))?;
        } else if (options.starts_record)(fields[0]) {
            report.records += 1;
            write!(writer, "\n{}", fields.join("\t"))?;
        } else {
            // Continuation data, spliced back onto the current record.
            write!(writer, "{}", fields.join("\t"))?;
        }
    }

    // Terminate the last record.
    if report.physical_lines > 0 {
        writeln!(writer)?;
    }

    if options.tally_field_counts {
        debug!(?tally, "physical line field counts");
        report.field_count_tally = Some(tally);
    }

    Ok(report)
}

/// Path-based wrapper around [`reassemble_records`]. Both file handles are
/// scoped to this call and released on every exit path.
pub fn reassemble_file<P, Q, F>(
    input: P,
    output: Q,
    options: &ReassembleOptions<F>,
) -> Result<ReassembleReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: Fn(&str) -> bool,
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

    let report = reassemble_records(reader, &mut writer, options)?;
    writer
        .flush()
        .with_context(|| format!("failed to flush output {}", output.display()))?;

    info!(
        physical_lines = report.physical_lines,
        records = report.records,
        elapsed = ?start.elapsed(),
        "reassembled {}",
        input.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use std::io::Cursor;
    use tempfile::NamedTempFile;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,sdsrepair::repair=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn reassemble_str<F: Fn(&str) -> bool>(
        input: &str,
        options: &ReassembleOptions<F>,
    ) -> Result<(String, ReassembleReport)> {
        let mut out = Vec::new();
        let report = reassemble_records(Cursor::new(input), &mut out, options)?;
        Ok((String::from_utf8(out)?, report))
    }

    #[test]
    fn splices_continuation_lines_into_their_record() -> Result<()> {
        init_test_logging();
        let input = "FILE\ta\tb\nsds001\t1\t2\n\t3\t4\n";
        let (out, report) = reassemble_str(input, &ReassembleOptions::default())?;
        assert_eq!(out, "FILE\ta\tb\nsds001\t1\t2\t3\t4\n");
        assert_eq!(report.physical_lines, 3);
        assert_eq!(report.records, 1);
        Ok(())
    }

    #[test]
    fn one_output_line_per_record_marker_plus_header() -> Result<()> {
        init_test_logging();
        let input = "FILE\tname\tvalue\n\
                     sds001\tfoo\nbar\tbaz\n\
                     sds002\tqux\n\
                     sds003\ta\nb\nc\n";
        let (out, report) = reassemble_str(input, &ReassembleOptions::default())?;
        assert_eq!(report.records, 3);
        assert_eq!(out.lines().count(), 4);
        Ok(())
    }

    #[test]
    fn strips_every_trailing_terminator() -> Result<()> {
        init_test_logging();
        let input = "FILE\ta\r\r\nsds001\t1\r\n";
        let (out, _) = reassemble_str(input, &ReassembleOptions::default())?;
        assert_eq!(out, "FILE\ta\nsds001\t1\n");
        Ok(())
    }

    #[test]
    fn data_field_with_marker_prefix_starts_a_spurious_record() -> Result<()> {
        init_test_logging();
        // The prefix check is a heuristic: a continuation line whose first
        // field happens to begin with `sds` gets split into its own record.
        let input = "FILE\ta\nsds001\t1\nsdsheet\t2\n";
        let (out, report) = reassemble_str(input, &ReassembleOptions::default())?;
        assert_eq!(report.records, 2);
        assert_eq!(out, "FILE\ta\nsds001\t1\nsdsheet\t2\n");
        Ok(())
    }

    #[test]
    fn record_predicate_is_injectable() -> Result<()> {
        init_test_logging();
        let options = ReassembleOptions {
            starts_record: |field: &str| field.starts_with("rec"),
            tally_field_counts: false,
        };
        let input = "FILE\ta\nrec1\t1\nsds999\t2\nrec2\t3\n";
        let (out, report) = reassemble_str(input, &options)?;
        assert_eq!(report.records, 2);
        assert_eq!(out, "FILE\ta\nrec1\t1sds999\t2\nrec2\t3\n");
        Ok(())
    }

    #[test]
    fn tally_counts_field_widths_when_enabled() -> Result<()> {
        init_test_logging();
        let options = ReassembleOptions {
            tally_field_counts: true,
            ..Default::default()
        };
        let input = "FILE\ta\tb\nsds001\t1\t2\n\t3\n";
        let (_, report) = reassemble_str(input, &options)?;
        let tally = report.field_count_tally.expect("tally requested");
        assert_eq!(tally.get(&3), Some(&2));
        assert_eq!(tally.get(&2), Some(&1));
        Ok(())
    }

    #[test]
    fn empty_input_produces_empty_output() -> Result<()> {
        init_test_logging();
        let (out, report) = reassemble_str("", &ReassembleOptions::default())?;
        assert_eq!(out, "");
        assert_eq!(report.physical_lines, 0);
        assert!(report.field_count_tally.is_none());
        Ok(())
    }

    #[test]
    fn repairs_a_file_on_disk() -> Result<()> {
        init_test_logging();
        let input = NamedTempFile::new()?;
        fs::write(input.path(), "FILE\ta\tb\nsds001\t1\t2\n\t3\t4\n")?;
        let output = NamedTempFile::new()?;

        let report = reassemble_file(input.path(), output.path(), &ReassembleOptions::default())?;
        assert_eq!(report.records, 1);
        assert_eq!(
            fs::read_to_string(output.path())?,
            "FILE\ta\tb\nsds001\t1\t2\t3\t4\n"
        );

        input.close()?;
        Ok(())
    }

    #[test]
    fn missing_input_is_fatal() {
        init_test_logging();
        let output = NamedTempFile::new().unwrap();
        let err = reassemble_file(
            "no_such_export.txt",
            output.path(),
            &ReassembleOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no_such_export.txt"));
    }
}
