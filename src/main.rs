//! devprivops CLI: privacy and threat analysis of system descriptions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use devprivops::analysis::schema::JsonSchemaValidator;
use devprivops::analysis::{Analyzer, URIS_FILE};
use devprivops::config::Config;
use devprivops::document::Value;
use devprivops::graph::compile::{AnonIds, Compiler};
use devprivops::graph::iri::AbbreviationTable;
use devprivops::paths::{ConfigRoots, GLOBAL_DIR, LOCAL_DIR};
use devprivops::query::SparqlBackend;
use devprivops::query::http::SparqlEndpoint;
use devprivops::query::store::SparqlStore;

#[derive(Parser)]
#[command(
    name = "devprivops",
    version,
    about = "Privacy and threat analysis of declarative system descriptions"
)]
struct Cli {
    /// Project-local configuration root.
    #[arg(long, global = true, default_value = LOCAL_DIR)]
    local_dir: PathBuf,

    /// System-wide configuration root.
    #[arg(long, global = true, default_value = GLOBAL_DIR)]
    global_dir: PathBuf,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plain log output for CI pipelines.
    #[arg(long, global = true)]
    pipeline: bool,

    #[command(flatten)]
    endpoint: EndpointArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[endpoint]` section of devprivops.toml.
#[derive(Args)]
struct EndpointArgs {
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    #[arg(long, global = true)]
    dataset: Option<String>,
    #[arg(long, global = true)]
    username: Option<String>,
    #[arg(long, global = true)]
    password: Option<String>,
    /// Request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Use an in-process store instead of the endpoint.
    #[arg(long, global = true)]
    in_memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and write the report.
    Analyse {
        /// Directory the report files are written to.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Visualizer URL each cycle's report is POSTed to.
        #[arg(long)]
        report_endpoint: Option<String>,
    },

    /// Run the regression scenarios in tests/spec.json.
    Test,

    /// Print the facts compiled from one description.
    Compile {
        /// Description path relative to the configuration roots.
        file: String,
    },

    /// Evaluate one attack or harm tree and print it as JSON.
    Tree {
        /// Tree path relative to the configuration roots.
        file: String,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_ansi(!cli.pipeline)
        .init();

    let roots = ConfigRoots::new(&cli.local_dir, &cli.global_dir);
    let mut config = Config::discover(&roots)?;
    cli.endpoint.apply(&mut config);

    match cli.command {
        Commands::Analyse {
            out_dir,
            report_endpoint,
        } => {
            let backend = open_backend(&cli.endpoint, &config)?;
            let validator = JsonSchemaValidator::new(&roots);
            let analyzer = Analyzer::new(&roots, backend.as_ref())?.with_validator(&validator);

            std::fs::create_dir_all(&out_dir).into_diagnostic()?;
            let timeout = Duration::from_secs(config.endpoint.timeout_secs);
            let report = analyzer.run_with(|cycle| {
                cycle.write_to(&out_dir)?;
                if let Some(url) = &report_endpoint {
                    cycle.send_to(url, timeout)?;
                }
                Ok(())
            })?;

            if !report.passed() {
                miette::bail!("too many policy or requirement violations");
            }
            println!("Analysis passed ({} cycle(s)).", report.cycles.len());
        }

        Commands::Compile { file } => {
            let table = AbbreviationTable::load(&roots.file(URIS_FILE)?)?;
            let doc = Value::read(&roots.file(&file)?)?;
            let compiler = Compiler::for_file(&table, &file)?;
            let triples = compiler.compile(&doc, &compiler.root(), &mut AnonIds::new())?;
            for triple in &triples {
                println!("{triple}");
            }
        }

        Commands::Test => {
            let backend = open_backend(&cli.endpoint, &config)?;
            let validator = JsonSchemaValidator::new(&roots);
            let analyzer = Analyzer::new(&roots, backend.as_ref())?.with_validator(&validator);

            let scenarios = analyzer.run_tests()?;
            let mut failed = 0;
            for scenario in &scenarios {
                for failure in &scenario.failures {
                    failed += 1;
                    println!("{} ({})", failure.query, scenario.state_dir);
                    let expected =
                        serde_json::to_string_pretty(&failure.expected).into_diagnostic()?;
                    let actual =
                        serde_json::to_string_pretty(&failure.actual).into_diagnostic()?;
                    println!("Expected: {expected}");
                    println!("Actual  : {actual}");
                }
            }
            if failed > 0 {
                miette::bail!("{failed} test(s) failed");
            }
            println!("All tests passed ({} scenario(s)).", scenarios.len());
        }

        Commands::Tree { file } => {
            let backend = open_backend(&cli.endpoint, &config)?;
            let analyzer =
                Analyzer::with_table(&roots, backend.as_ref(), AbbreviationTable::new());
            let tree = analyzer.evaluate_tree(&file)?;
            let json = serde_json::to_string_pretty(&tree).into_diagnostic()?;
            println!("{json}");
            if let Some(error) = &tree.error {
                miette::bail!("{error}");
            }
        }
    }

    Ok(())
}

impl EndpointArgs {
    fn apply(&self, config: &mut Config) {
        let endpoint = &mut config.endpoint;
        if let Some(host) = &self.host {
            endpoint.host = host.clone();
        }
        if let Some(port) = self.port {
            endpoint.port = port;
        }
        if let Some(dataset) = &self.dataset {
            endpoint.dataset = dataset.clone();
        }
        if let Some(username) = &self.username {
            endpoint.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            endpoint.password = Some(password.clone());
        }
        if let Some(timeout) = self.timeout {
            endpoint.timeout_secs = timeout;
        }
    }
}

fn open_backend(args: &EndpointArgs, config: &Config) -> Result<Box<dyn SparqlBackend>> {
    if args.in_memory {
        tracing::info!("using in-process graph store");
        return Ok(Box::new(SparqlStore::in_memory()?));
    }
    let endpoint = SparqlEndpoint::new(&config.endpoint);
    tracing::info!(url = endpoint.base_url(), "using SPARQL endpoint");
    Ok(Box::new(endpoint))
}
