//! apiplan CLI - Run declarative test plans against OpenAPI-described APIs

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use apiplan_core::dryrun::{self, ValidationStatus};
use apiplan_core::{ApiDocument, Config, DryRunPlan, ObjectStore, ParameterFill, TestPlan};
use apiplan_runner::{HttpTransport, PlanRunner};

#[derive(Parser)]
#[command(name = "apiplan")]
#[command(about = "Run declarative test plans against OpenAPI-described HTTP APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test cases
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Case to run (repeatable; default: every case in plan order)
        #[arg(long = "case")]
        cases: Vec<String>,

        /// Server to test (overrides config and document)
        #[arg(long)]
        base_url: Option<String>,

        /// RNG seed for reproducible parameter values
        #[arg(long)]
        seed: Option<u64>,

        /// Missing parameters generated per step
        #[arg(long)]
        fill: Option<FillArg>,

        /// Store objects found in JSON responses
        #[arg(long)]
        ingest: bool,
    },

    /// Validate config, document and plan without sending requests
    Check {
        #[command(flatten)]
        source: SourceArgs,

        /// Case to check (repeatable; default: every case)
        #[arg(long = "case")]
        cases: Vec<String>,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for the test plan format
    Schema,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Config file (default: .apiplan.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API document (overrides config)
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Test plan (overrides config)
    #[arg(long)]
    plan: Option<PathBuf>,
}

impl SourceArgs {
    fn load(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_default()?,
        };
        if let Some(spec) = &self.spec {
            cfg.spec.clone_from(spec);
        }
        if let Some(plan) = &self.plan {
            cfg.plan.clone_from(plan);
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FillArg {
    FirstMissing,
    AllMissing,
}

impl From<FillArg> for ParameterFill {
    fn from(arg: FillArg) -> Self {
        match arg {
            FillArg::FirstMissing => Self::FirstMissing,
            FillArg::AllMissing => Self::AllMissing,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .target(env_logger::Target::Stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn load_inputs(cfg: &Config) -> Result<(ApiDocument, TestPlan)> {
    let document = ApiDocument::load(&cfg.spec)
        .with_context(|| format!("loading API document {}", cfg.spec.display()))?;
    let plan = TestPlan::load(&cfg.plan)
        .with_context(|| format!("loading test plan {}", cfg.plan.display()))?;
    log::debug!(
        "{} operations, {} definitions, {} cases",
        document.operations().len(),
        document.graph().definitions().len(),
        plan.len()
    );
    Ok((document, plan))
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            source,
            cases,
            base_url,
            seed,
            fill,
            ingest,
        } => {
            let mut cfg = source.load()?;
            if !cases.is_empty() {
                cfg.cases = cases;
            }
            if base_url.is_some() {
                cfg.base_url = base_url;
            }
            if seed.is_some() {
                cfg.seed = seed;
            }
            if let Some(fill) = fill {
                cfg.parameter_fill = fill.into();
            }
            cfg.ingest_responses |= ingest;

            let (document, plan) = load_inputs(&cfg)?;
            let transport = HttpTransport::new(Duration::from_secs(cfg.timeout_secs))?;
            let store = ObjectStore::new(document.graph().clone());
            let mut runner = PlanRunner::new(&document, &plan, &transport)
                .with_base_url(cfg.base_url.as_deref())
                .with_headers(cfg.headers.clone())
                .with_fill(cfg.parameter_fill)
                .with_seed(cfg.seed)
                .with_ingest(cfg.ingest_responses.then_some(&store));

            if runner.base_url().is_empty() {
                bail!("no base_url configured and the document declares no server");
            }

            let names: Vec<String> = if cfg.cases.is_empty() {
                plan.cases().iter().map(|c| c.name.clone()).collect()
            } else {
                cfg.cases.clone()
            };

            if cli.output == OutputFormat::Terminal {
                eprintln!("Config:");
                eprintln!("  spec:     {}", cfg.spec.display());
                eprintln!("  plan:     {}", cfg.plan.display());
                eprintln!("  base_url: {}", runner.base_url());
                if !cfg.headers.is_empty() {
                    eprintln!("  headers:  {} configured", cfg.headers.len());
                }
                eprintln!();
            }

            let mut results = Vec::new();
            let mut failed = 0;
            for name in &names {
                match runner.run_case(name) {
                    Ok(report) => {
                        if cli.output == OutputFormat::Terminal {
                            println!("PASS {name} ({} requests)", report.requests.len());
                            for r in &report.requests {
                                println!("  {} {} -> {}", r.method, r.url, r.status);
                            }
                        }
                        results.push(serde_json::json!({
                            "case": name,
                            "status": "pass",
                            "requests": report.requests,
                        }));
                    }
                    Err(e) => {
                        failed += 1;
                        log::error!("case {name}: {e}");
                        results.push(serde_json::json!({
                            "case": name,
                            "status": "fail",
                            "kind": e.kind().as_str(),
                            "error": e.to_string(),
                        }));
                        if cli.output == OutputFormat::Terminal {
                            println!("FAIL {name}: {e} [{}]", e.kind());
                        }
                    }
                }
            }

            match cli.output {
                OutputFormat::Terminal => {
                    println!(
                        "\n{} cases: {} passed, {failed} failed",
                        names.len(),
                        names.len() - failed
                    );
                    if cfg.ingest_responses {
                        for class in store.class_names() {
                            let n = store.len(&class)?;
                            if n > 0 {
                                println!("  stored {class}: {n}");
                            }
                        }
                    }
                }
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "cases": results,
                        "passed": names.len() - failed,
                        "failed": failed,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Silent => {}
            }

            Ok(i32::from(failed > 0))
        }

        Commands::Check { source, cases } => {
            let cfg = source.load()?;
            let selected = if cases.is_empty() { cfg.cases.clone() } else { cases };

            let config_checks = dryrun::validate_config(&cfg);
            if config_checks
                .iter()
                .any(|v| v.status == ValidationStatus::Error)
            {
                if cli.output != OutputFormat::Silent {
                    eprintln!("Validation:");
                    for v in &config_checks {
                        eprintln!("  [{}] {}", v.status, v.message);
                    }
                }
                return Ok(3);
            }

            let (document, plan) = load_inputs(&cfg)?;
            let mut dry = DryRunPlan::build(&document, &plan, cfg.parameter_fill, &selected);
            let mut validations = config_checks;
            validations.push(dryrun::validate_base_url(cfg.base_url.as_deref(), &document));
            validations.append(&mut dry.validations);
            dry.validations = validations;

            match cli.output {
                OutputFormat::Terminal => println!("{}", dry.to_terminal()),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dry)?),
                OutputFormat::Silent => {}
            }
            Ok(i32::from(dry.has_errors()))
        }

        Commands::Init => {
            let config_path = ".apiplan.toml";
            if std::path::Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - spec: path to your OpenAPI / Swagger document");
            println!("  - plan: path to your test plan");
            println!("  - headers: auth tokens, API keys");
            Ok(0)
        }

        Commands::Schema => {
            println!("{}", apiplan_core::plan::generate_schema());
            Ok(0)
        }
    }
}
