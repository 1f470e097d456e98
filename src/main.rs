//! Converge CLI entrypoint.
//!
//! This is the main entrypoint for the converge command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cloud_converge::adapter::AdapterRegistry;
use cloud_converge::cli::{Backend, Cli, Commands, OutputFormatter};
use cloud_converge::cloud::{ArmClient, CloudClient, LocalCloud};
use cloud_converge::error::{ConfigError, ReconcileError, Result};
use cloud_converge::planner::{Action, plan_offline};
use cloud_converge::reconciler::{ReconcileOptions, Reconciler, fill_default_location};
use cloud_converge::request::{Request, RequestFile, RequestHasher, RequestParser, RequestValidator};
use cloud_converge::suspend::CancelSignal;
use cloud_converge::verdict::Verdict;

use clap::Parser;
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system on stderr.
///
/// `--verbose` forces debug; otherwise `RUST_LOG` applies, defaulting to info.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point. Returns false when the command failed in a way
/// that is reported rather than raised, such as an error verdict.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    let registry = AdapterRegistry::builtin();

    match cli.command {
        Commands::Validate { ref file } => cmd_validate(file, &registry, &formatter),
        Commands::Plan { ref file } => cmd_plan(&cli, file, &registry, &formatter).await,
        Commands::Apply {
            ref file,
            yes,
            force_update,
        } => cmd_apply(&cli, file, yes, force_update, &registry, &formatter).await,
        Commands::Destroy { ref file, yes } => cmd_destroy(&cli, file, yes, &registry, &formatter).await,
        Commands::Diff {
            ref file,
            ref observed,
        } => cmd_diff(file, observed.as_deref(), &registry, &formatter),
        Commands::Kinds => {
            println!("{}", formatter.format_kinds(&registry));
            Ok(true)
        }
        Commands::Schema { ref kind } => cmd_schema(kind, &registry, &formatter),
    }
}

/// Validate a request file.
fn cmd_validate(file: &Path, registry: &AdapterRegistry, formatter: &OutputFormatter) -> Result<bool> {
    let request_file = load_request(file)?;
    info!("Validating request: {}", file.display());

    let result = RequestValidator::new(registry).check(&request_file.request);
    let hash = RequestHasher::new().hash_request(&request_file.request);

    println!("{}", formatter.format_validation(&result, &request_file.request, &hash));
    Ok(result.is_valid())
}

/// Show what apply would do.
async fn cmd_plan(cli: &Cli, file: &Path, registry: &AdapterRegistry, formatter: &OutputFormatter) -> Result<bool> {
    let request_file = load_request(file)?;
    let mut request = request_file.request.clone().with_dry_run(true);

    let client = create_client(cli)?;
    fill_default_location(&mut request, registry, client.as_ref()).await?;
    RequestValidator::new(registry).validate(&request)?;

    let verdict = reconcile(client.as_ref(), registry, &request_file, &request).await;

    print_verdict(formatter, &verdict, &request);
    Ok(verdict.is_success())
}

/// Converge the resource.
async fn cmd_apply(
    cli: &Cli,
    file: &Path,
    auto_approve: bool,
    force_update: bool,
    registry: &AdapterRegistry,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let request_file = load_request(file)?;
    let mut request = request_file.request.clone();
    request.force_update |= force_update;

    let client = create_client(cli)?;
    fill_default_location(&mut request, registry, client.as_ref()).await?;

    let validation = RequestValidator::new(registry).validate(&request)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    if !auto_approve && !request.dry_run {
        let preview = reconcile(client.as_ref(), registry, &request_file, &request.clone().with_dry_run(true)).await;
        print_verdict(formatter, &preview, &request);
        if !preview.is_success() {
            return Ok(false);
        }
        if preview.action == Action::None {
            eprintln!("No changes to apply.");
            return Ok(true);
        }
        if !confirm("Do you want to apply this plan? [y/N]: ", |input| input.eq_ignore_ascii_case("y"))? {
            eprintln!("Apply cancelled.");
            return Ok(true);
        }
    }

    let verdict = reconcile(client.as_ref(), registry, &request_file, &request).await;
    print_verdict(formatter, &verdict, &request);
    Ok(verdict.is_success())
}

/// Delete the resource named by a request file.
async fn cmd_destroy(
    cli: &Cli,
    file: &Path,
    auto_approve: bool,
    registry: &AdapterRegistry,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let request_file = load_request(file)?;
    let mut request = Request::absent(request_file.request.kind.clone(), request_file.request.identity.clone());
    request.defaults = request_file.request.defaults.clone();
    request.dry_run = request_file.request.dry_run;
    RequestValidator::new(registry).validate(&request)?;
    debug!("Destroy requested for {} {}", request.kind, request.identity);

    let client = create_client(cli)?;

    if !auto_approve && !request.dry_run {
        let preview = reconcile(client.as_ref(), registry, &request_file, &request.clone().with_dry_run(true)).await;
        if !preview.is_success() {
            print_verdict(formatter, &preview, &request);
            return Ok(false);
        }
        if preview.action == Action::None {
            eprintln!("Nothing to destroy: {} does not exist.", preview.identity);
            return Ok(true);
        }

        eprintln!("The following resource will be destroyed:");
        eprintln!("  - {}", preview.identity);
        if !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", |input| input == "destroy")? {
            eprintln!("Destruction cancelled.");
            return Ok(true);
        }
    }

    let verdict = reconcile(client.as_ref(), registry, &request_file, &request).await;
    print_verdict(formatter, &verdict, &request);
    Ok(verdict.is_success())
}

/// Compare a request against a provider document without contacting the cloud.
fn cmd_diff(
    file: &Path,
    observed: Option<&Path>,
    registry: &AdapterRegistry,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let request_file = load_request(file)?;
    let request = &request_file.request;
    let adapter = registry.get(&request.kind).ok_or_else(|| ReconcileError::UnknownKind {
        kind: request.kind.clone(),
    })?;

    let resource = observed.map(load_json).transpose()?;
    let plan = plan_offline(adapter.as_ref(), request, resource.as_ref())?;

    println!("{}", formatter.format_plan(&plan, &adapter.display_identity(&request.identity)));
    Ok(true)
}

/// Show the schema of a kind.
fn cmd_schema(kind: &str, registry: &AdapterRegistry, formatter: &OutputFormatter) -> Result<bool> {
    let adapter = registry.get(kind).ok_or_else(|| ReconcileError::UnknownKind {
        kind: kind.to_string(),
    })?;
    println!("{}", formatter.format_schema(adapter.schema()));
    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads a request file, reading `.env` from its directory first.
fn load_request(file: &Path) -> Result<RequestFile> {
    let base = file.parent().unwrap_or_else(|| Path::new("."));
    let parser = RequestParser::new().with_base_path(base);
    parser.load_dotenv()?;
    parser.load_file(file)
}

/// Reads a JSON document from disk.
fn load_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        ConfigError::ParseError {
            message: format!("JSON parse error: {e}"),
            location: Some(path.display().to_string()),
        }
        .into()
    })
}

/// Creates the client for the selected backend.
fn create_client(cli: &Cli) -> Result<Box<dyn CloudClient>> {
    match cli.backend {
        Backend::Arm => {
            let token = RequestParser::arm_token()?;
            let client = match RequestParser::arm_endpoint() {
                Some(endpoint) => ArmClient::with_endpoint(&endpoint, &token)?,
                None => ArmClient::new(&token)?,
            };
            debug!("Using resource manager at {}", client.endpoint());
            Ok(Box::new(client))
        }
        Backend::Local => {
            let dir: PathBuf = match &cli.state_dir {
                Some(dir) => dir.clone(),
                None => LocalCloud::default_dir()?,
            };
            let cloud = LocalCloud::with_base_dir(dir);
            debug!("Using local backend at {}", cloud.store_path().display());
            Ok(Box::new(cloud))
        }
    }
}

/// Runs one reconciliation, canceling it on Ctrl-C.
async fn reconcile(
    client: &dyn CloudClient,
    registry: &AdapterRegistry,
    request_file: &RequestFile,
    request: &Request,
) -> Verdict {
    let (handle, signal) = CancelSignal::pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, canceling");
            handle.cancel();
        }
    });

    let verdict = Reconciler::new(registry, client)
        .with_options(ReconcileOptions::from(&request_file.timeouts))
        .with_cancel(signal)
        .reconcile(request)
        .await;

    interrupt.abort();
    verdict
}

/// Prints a verdict to stdout with the request fingerprint.
fn print_verdict(formatter: &OutputFormatter, verdict: &Verdict, request: &Request) {
    let hash = RequestHasher::new().hash_request(request);
    println!("{}", formatter.format_verdict(verdict, Some(&hash)));
}

/// Prompts on stderr and reads one line from stdin.
fn confirm(prompt: &str, accept: impl Fn(&str) -> bool) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(accept(input.trim()))
}
