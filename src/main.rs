use anyhow::Result;
use sdsrepair::{
    config::{Config, Mode},
    repair::{fix, fixers::FixerRegistry, reassemble},
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) resolve config ───────────────────────────────────────────
    let config = Config::load()?;
    info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        mode = ?config.mode,
        "repairing export"
    );

    // ─── 3) run the selected repair pass ─────────────────────────────
    match config.mode {
        Mode::Reassemble => {
            let options = reassemble::ReassembleOptions {
                tally_field_counts: config.tally_field_counts,
                ..Default::default()
            };
            let report =
                reassemble::reassemble_file(&config.input_path, &config.output_path, &options)?;
            info!(records = report.records, "done");
        }
        Mode::Fix => {
            let report = fix::fix_file(
                &config.input_path,
                &config.output_path,
                &FixerRegistry::standard(),
            )?;
            info!(
                data_rows = report.data_rows,
                mismatched_rows = report.mismatched_rows,
                "done"
            );
        }
    }

    Ok(())
}
