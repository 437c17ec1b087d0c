// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use repsel_cli::{
    ASSIGNMENTS_FILE, ConfigOverrides, REPORT_FILE, REPRESENTATIVE_IDS_FILE, REPRESENTATIVES_FILE,
    parse_config_json, parse_records_json, render_artifacts, run_pipeline,
};
use repsel_core::{AttributeKind, RecordSet, RepselError, RunConfig, RunWarning};
use repsel_stats::{
    AssociationOutcome, AssumptionResult, AttributeProfile, Grouping, assess_attribute,
    assess_attributes, categorical_association, correlation_matrix, group_comparison,
    profile_records,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Selects representative imaging series by statistics-driven clustering.
#[derive(Parser)]
#[command(name = "repsel", version, about)]
struct Cli {
    /// Verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct InputArgs {
    /// JSON array of series records.
    #[arg(long)]
    input: PathBuf,
    /// JSON run configuration; omitted fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    k_min: Option<usize>,
    #[arg(long)]
    k_max: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every stage and write assignment, representative and report files.
    Run {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Completeness and summary statistics per attribute.
    Profile {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Normality and homoscedasticity per continuous attribute.
    Assumptions {
        #[command(flatten)]
        input: InputArgs,
        /// `provenance`, a categorical attribute name, or `none`.
        #[arg(long, default_value = "provenance")]
        group_by: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Association of one attribute against provenance or another attribute.
    Associate {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        attribute: String,
        /// `provenance` or an attribute name.
        #[arg(long, default_value = "provenance")]
        against: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Repsel(#[from] RepselError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },
}

impl CliError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Repsel(err) => err.code(),
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    command: &'static str,
    records: usize,
    clustered: usize,
    selected_k: usize,
    representatives: usize,
    warnings: &'a [RunWarning],
    files: Vec<String>,
}

#[derive(Serialize)]
struct ProfileOutput<'a> {
    command: &'static str,
    records: usize,
    profiles: &'a [AttributeProfile],
}

#[derive(Serialize)]
struct AssumptionsOutput<'a> {
    command: &'static str,
    grouping: Option<&'a Grouping>,
    results: &'a BTreeMap<String, Vec<AssumptionResult>>,
}

#[derive(Serialize)]
struct AssociateOutput<'a> {
    command: &'static str,
    attribute: &'a str,
    against: &'a str,
    outcome: &'a AssociationOutcome,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli.command) {
        emit_structured_error(&err);
        process::exit(1);
    }
}

/// `RUST_LOG`, when set and valid, wins over `-v`.
fn log_filter(verbose: u8, rust_log: Option<&str>) -> EnvFilter {
    if let Some(filter) = rust_log
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
    {
        return filter;
    }
    EnvFilter::new(match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })
}

fn init_tracing(verbose: u8) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Run { input, output_dir } => handle_run(&input, &output_dir),
        Command::Profile { input, output } => handle_profile(&input, output.as_deref()),
        Command::Assumptions {
            input,
            group_by,
            output,
        } => handle_assumptions(&input, &group_by, output.as_deref()),
        Command::Associate {
            input,
            attribute,
            against,
            output,
        } => handle_associate(&input, &attribute, &against, output.as_deref()),
    }
}

fn read_text(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path)
        .map_err(|source| CliError::io(format!("failed to read '{}'", path.display()), source))
}

fn write_text(path: &Path, contents: &str) -> Result<(), CliError> {
    fs::write(path, contents)
        .map_err(|source| CliError::io(format!("failed to write '{}'", path.display()), source))
}

fn load_records(path: &Path) -> Result<RecordSet, CliError> {
    let records = parse_records_json(&read_text(path)?)?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded records");
    Ok(records)
}

fn load_inputs(args: &InputArgs) -> Result<(RecordSet, RunConfig), CliError> {
    let records = load_records(&args.input)?;
    let config = match &args.config {
        Some(path) => parse_config_json(&read_text(path)?)?,
        None => RunConfig::default(),
    };
    let config = ConfigOverrides {
        seed: args.seed,
        k_min: args.k_min,
        k_max: args.k_max,
    }
    .apply(config)?;
    Ok((records, config))
}

fn write_json_output<T: Serialize>(payload: &T, output: Option<&Path>) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(payload)
        .map_err(|source| CliError::json("failed to serialize JSON output", source))?;
    match output {
        Some(path) => write_text(path, &format!("{encoded}\n")),
        None => {
            println!("{encoded}");
            Ok(())
        }
    }
}

fn handle_run(args: &InputArgs, output_dir: &Path) -> Result<(), CliError> {
    let (records, config) = load_inputs(args)?;
    let report = run_pipeline(&records, &config)?;
    let artifacts = render_artifacts(&records, &report);

    fs::create_dir_all(output_dir).map_err(|source| {
        CliError::io(
            format!("failed to create '{}'", output_dir.display()),
            source,
        )
    })?;
    let report_json = serde_json::to_string_pretty(&report)
        .map_err(|source| CliError::json("failed to serialize run report", source))?;
    let files = [
        (ASSIGNMENTS_FILE, artifacts.assignments_csv.as_str()),
        (REPRESENTATIVES_FILE, artifacts.representatives_csv.as_str()),
        (REPRESENTATIVE_IDS_FILE, artifacts.representative_ids.as_str()),
        (REPORT_FILE, report_json.as_str()),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = output_dir.join(name);
        write_text(&path, contents)?;
        written.push(path.display().to_string());
    }

    write_json_output(
        &RunSummary {
            command: "run",
            records: records.len(),
            clustered: report.metadata.clustered_count,
            selected_k: report.selected_k(),
            representatives: report.representatives.len(),
            warnings: &report.metadata.warnings,
            files: written,
        },
        None,
    )
}

fn handle_profile(input: &Path, output: Option<&Path>) -> Result<(), CliError> {
    let records = load_records(input)?;
    let profiles = profile_records(&records);
    write_json_output(
        &ProfileOutput {
            command: "profile",
            records: records.len(),
            profiles: &profiles,
        },
        output,
    )
}

fn parse_grouping(records: &RecordSet, raw: &str) -> Result<Option<Grouping>, CliError> {
    match raw {
        "none" => Ok(None),
        "provenance" => Ok(Some(Grouping::Provenance)),
        name => match records.kind_of(name) {
            Some(AttributeKind::Categorical) => Ok(Some(Grouping::Attribute(name.to_string()))),
            _ => Err(RepselError::invalid_input(format!(
                "--group-by expects 'provenance', 'none' or a categorical attribute; got '{name}'"
            ))
            .into()),
        },
    }
}

fn handle_assumptions(
    args: &InputArgs,
    group_by: &str,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let (records, config) = load_inputs(args)?;
    let grouping = parse_grouping(&records, group_by)?;
    let continuous = records.attributes_of_kind(AttributeKind::Continuous);
    let results = assess_attributes(&records, &continuous, grouping.as_ref(), &config)?;
    write_json_output(
        &AssumptionsOutput {
            command: "assumptions",
            grouping: grouping.as_ref(),
            results: &results,
        },
        output,
    )
}

fn handle_associate(
    args: &InputArgs,
    attribute: &str,
    against: &str,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let (records, config) = load_inputs(args)?;
    let outcome = match records.kind_of(attribute) {
        Some(AttributeKind::Continuous)
            if records.kind_of(against) == Some(AttributeKind::Continuous) =>
        {
            let pair = [attribute, against];
            let assumptions = assess_attributes(&records, &pair, None, &config)?;
            let matrix = correlation_matrix(&records, &pair, &assumptions)?;
            if let Some(skipped) = matrix.skipped.first() {
                return Err(RepselError::invalid_input(format!(
                    "correlation {attribute}~{against} could not be computed: {}",
                    skipped.reason
                ))
                .into());
            }
            matrix
                .entries
                .into_iter()
                .next()
                .map(|entry| entry.outcome)
                .ok_or_else(|| RepselError::numerical_issue("correlation produced no entry"))?
        }
        Some(AttributeKind::Continuous) => {
            let grouping = parse_grouping(&records, against)?
                .ok_or_else(|| RepselError::invalid_input("--against none is not supported"))?;
            let assumptions = assess_attribute(&records, attribute, Some(&grouping), &config)?;
            group_comparison(&records, attribute, &grouping, &assumptions)?
        }
        Some(AttributeKind::Categorical) => {
            let grouping = parse_grouping(&records, against)?
                .ok_or_else(|| RepselError::invalid_input("--against none is not supported"))?;
            categorical_association(&records, attribute, &grouping)?
        }
        None => {
            return Err(
                RepselError::invalid_input(format!("unknown attribute '{attribute}'")).into(),
            );
        }
    };

    if let Some(fallback) = &outcome.fallback {
        tracing::warn!(
            requested = fallback.requested.as_str(),
            applied = fallback.applied.as_str(),
            reason = %fallback.reason,
            "procedure fallback"
        );
    }
    write_json_output(
        &AssociateOutput {
            command: "associate",
            attribute,
            against,
            outcome: &outcome,
        },
        output,
    )
}

fn emit_structured_error(err: &CliError) {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!(
            "{{\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            err.code(),
            err
        ),
    }
}
