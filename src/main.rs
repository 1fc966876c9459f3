//! epiform - malaria investigation form extractor
//!
//! Usage:
//!   epiform process <FILES>...     OCR scanned forms and export the records
//!   epiform fields                 List the field catalog
//!   epiform config                 Print the effective configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use epiform_lib::config::{self, APP_NAME, APP_VERSION};
use epiform_lib::export::{
    render_report, write_csv, write_file, write_xlsx, ReportOptions, Table, DEFAULT_SHEET_NAME,
};
use epiform_lib::pipeline::processor::build_processor;
use epiform_lib::pipeline_config::PipelineConfig;

#[derive(Parser)]
#[command(name = "epiform", version, about = "Extract patient records from scanned malaria investigation forms")]
struct Cli {
    /// Configuration file (TOML). Defaults to ~/Epiform/epiform.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR documents, extract one record per form and write the exports
    Process {
        /// PDF or image files, processed in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory [default: ~/Documents/Epiform]
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Base name of the exported files
        #[arg(long, default_value = "malaria_data")]
        name: String,

        /// Skip the PDF report
        #[arg(long)]
        no_report: bool,
    },
    /// List the field catalog in export order
    Fields,
    /// Print the effective configuration as TOML
    Config,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => config::default_config_path().filter(|p| p.exists()),
    };
    match path {
        Some(p) => PipelineConfig::load(&p)
            .with_context(|| format!("Failed to load configuration {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn process(
    config: &PipelineConfig,
    files: &[PathBuf],
    out_dir: Option<PathBuf>,
    name: &str,
    no_report: bool,
) -> Result<()> {
    let processor = build_processor(config).context("Failed to initialize the pipeline")?;

    let outcome = processor.process_files(files);
    let records = outcome.records();
    let table = Table::from_records(processor.columns(), &records);

    let out_dir = out_dir.unwrap_or_else(config::default_output_dir);
    let xlsx = out_dir.join(format!("{name}.xlsx"));
    write_file(&xlsx, &write_xlsx(&table, DEFAULT_SHEET_NAME)?)?;
    write_file(&out_dir.join(format!("{name}.csv")), &write_csv(&table)?)?;
    write_file(
        &out_dir.join(format!("{name}.json")),
        &serde_json::to_vec_pretty(&outcome)?,
    )?;
    if !no_report {
        let options = ReportOptions::for_catalog(processor.catalog(), config.header_style);
        write_file(
            &out_dir.join(format!("{name}_report.pdf")),
            &render_report(&table, &options)?,
        )?;
    }

    println!(
        "{} form(s) from {} document(s) written to {}",
        outcome.form_count(),
        outcome.documents.len(),
        out_dir.display()
    );
    for failure in &outcome.failures {
        println!("  failed: {}: {}", failure.source_name, failure.error);
    }
    for document in &outcome.documents {
        if document.recognition_failures > 0 {
            println!(
                "  {}: {} page(s) could not be recognized",
                document.source_name, document.recognition_failures
            );
        }
    }
    for (index, issues) in processor.validator().validate_batch(&records) {
        for issue in issues {
            println!("  record {index}: {issue}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    epiform_lib::init_tracing();
    let cli = Cli::parse();
    tracing::info!("{APP_NAME} v{APP_VERSION}");

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Process {
            files,
            out_dir,
            name,
            no_report,
        } => process(&config, &files, out_dir, &name, no_report),
        Command::Fields => {
            let catalog = config.catalog()?;
            for (i, field) in catalog.fields().iter().enumerate() {
                println!(
                    "{:>2}  {:<20} {:<14} {}",
                    i + 1,
                    field.key,
                    field.section,
                    field.bilingual_header()
                );
            }
            Ok(())
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
