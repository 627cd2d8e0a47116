//! nbrun: command line client for a notebook cell execution backend.
//!
//! Results and converted documents go to stdout or the named output file;
//! progress and diagnostics go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::api::{CellKind, DEFAULT_DTYPE, DEFAULT_RESULT_VAR, ExecuteRequest};
use crate::client::HttpCellApi;
use crate::config::ClientConfig;
use crate::export::render_static;
use crate::notebook::{Notebook, notebook_to_script, script_to_notebook};
use crate::runner::{CellConfig, PollPolicy, SqlCell, run_cell, run_notebook};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("api error: {0}")]
    Api(#[from] crate::api::ApiError),
    #[error("run error: {0}")]
    Run(#[from] crate::runner::RunError),
    #[error("notebook error: {0}")]
    Notebook(#[from] crate::notebook::NotebookError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{failed} cell(s) failed")]
    CellsFailed { failed: usize },
    #[error("cannot infer conversion from `{input}` to `{output}`; expected .ngnb and .py")]
    UnknownConversion { input: String, output: String },
}

#[derive(Parser, Debug)]
#[command(name = "nbrun", about = "Notebook cell execution client")]
struct Cli {
    #[arg(long, env = "NBRUN_BASE_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single cell and print the result payload.
    Exec(ExecArgs),
    /// Operate on .ngnb notebooks.
    Notebook(NotebookCommand),
    /// Render a notebook as a self-contained HTML page.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Inline source text. Reads stdin when neither --sql nor --file is given.
    #[arg(long, conflicts_with = "file")]
    sql: Option<String>,

    /// Read the source text from a file.
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long, default_value = "")]
    connection: String,

    #[arg(long, default_value = DEFAULT_RESULT_VAR)]
    result_var: String,

    #[arg(long, default_value = DEFAULT_DTYPE)]
    dtype: String,

    /// Backend session to run in; omitted from the request when absent.
    #[arg(long)]
    session: Option<String>,

    /// Submit as a python cell instead of sql.
    #[arg(long, default_value_t = false)]
    python: bool,
}

#[derive(Args, Debug)]
struct NotebookCommand {
    #[command(subcommand)]
    command: NotebookSubcommand,
}

#[derive(Subcommand, Debug)]
enum NotebookSubcommand {
    /// Run every sql/python cell in order, embedding outputs.
    Run(NotebookRunArgs),
    /// Convert between .ngnb and # %% script form, inferred from extensions.
    Convert { input: PathBuf, output: PathBuf },
}

#[derive(Args, Debug)]
struct NotebookRunArgs {
    input: PathBuf,

    /// Where to write the executed notebook; defaults to the input path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep running cells after one fails.
    #[arg(long, default_value_t = false)]
    keep_going: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    input: PathBuf,

    /// Where to write the HTML; defaults to the input path with `.html`.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Parse arguments and dispatch. Called from `main`.
///
/// # Errors
///
/// Returns a [`CliError`] for any failed operation; `main` renders it to
/// stderr and exits nonzero.
pub async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = ClientConfig::from_env().with_base_url(&cli.base_url);

    match cli.command {
        Command::Exec(args) => run_exec(&config, args).await,
        Command::Notebook(notebook) => match notebook.command {
            NotebookSubcommand::Run(args) => run_notebook_file(&config, args).await,
            NotebookSubcommand::Convert { input, output } => run_convert(&input, &output),
        },
        Command::Export(args) => run_export(&args),
    }
}

async fn run_exec(config: &ClientConfig, args: ExecArgs) -> Result<(), CliError> {
    let source = read_source(args.sql, args.file.as_deref())?;
    let api = HttpCellApi::new(config)?;
    let policy = PollPolicy::from_env();

    let result = if args.python {
        let request = ExecuteRequest {
            cell_type: CellKind::Python,
            source,
            connection: args.connection,
            result_var: args.result_var,
            dtype: args.dtype,
            session_id: args.session,
        };
        run_cell(&api, &request, &policy).await?
    } else {
        let cell = SqlCell::with_source(
            CellConfig {
                connection: args.connection,
                result_var: args.result_var,
                dtype: args.dtype,
                session_id: args.session,
            },
            source,
        );
        cell.run(&api, &policy).await?
    };

    print_json(&result)?;
    Ok(())
}

async fn run_notebook_file(config: &ClientConfig, args: NotebookRunArgs) -> Result<(), CliError> {
    let mut notebook = Notebook::load(&args.input)?;
    let session_id = Uuid::new_v4().to_string();
    eprintln!("running {} (session {session_id})", args.input.display());

    let api = HttpCellApi::new(config)?;
    let report = run_notebook(&api, &mut notebook, &PollPolicy::from_env(), &session_id, args.keep_going).await;

    let output = args.output.as_deref().unwrap_or(&args.input);
    notebook.save(output)?;
    eprintln!(
        "notebook run complete: executed={} failed={} skipped={} -> {}",
        report.executed,
        report.failed,
        report.skipped,
        output.display()
    );

    if report.failed > 0 {
        return Err(CliError::CellsFailed { failed: report.failed });
    }
    Ok(())
}

fn run_convert(input: &Path, output: &Path) -> Result<(), CliError> {
    match (extension(input), extension(output)) {
        (Some("ngnb"), Some("py")) => {
            let notebook = Notebook::load(input)?;
            std::fs::write(output, notebook_to_script(&notebook))?;
        }
        (Some("py"), Some("ngnb")) => {
            let notebook = script_to_notebook(&std::fs::read_to_string(input)?);
            notebook.save(output)?;
        }
        _ => {
            return Err(CliError::UnknownConversion {
                input: input.display().to_string(),
                output: output.display().to_string(),
            });
        }
    }
    eprintln!("converted {} -> {}", input.display(), output.display());
    Ok(())
}

fn run_export(args: &ExportArgs) -> Result<(), CliError> {
    let notebook = Notebook::load(&args.input)?;
    let html = render_static(&notebook);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("html"));
    std::fs::write(&output, html)?;
    eprintln!("exported {} -> {}", args.input.display(), output.display());
    Ok(())
}

fn read_source(inline: Option<String>, file: Option<&Path>) -> Result<String, CliError> {
    if let Some(sql) = inline {
        return Ok(sql);
    }
    if let Some(path) = file {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut source = String::new();
    std::io::stdin().read_to_string(&mut source)?;
    Ok(source)
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
