//! Formwire command-line tools.
//!
//! Provides the `formwire` binary for inspecting how a compiled form (JSON)
//! gets wired: the dependency edges, an evaluation order over them, and the
//! overlay edges produced by materializing collection iterations.
//!
//! Exit codes: 0 = success, 1 = wiring or evaluation failure, 3 = I/O error.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use formwire_core::schedule::evaluation_order;
use formwire_core::{CompiledForm, DependencyEdge, NodeId, NodeKind, NodeSource};
use formwire_runtime::{FormRegistry, RuntimeError};
use formwire_wiring::{MalformedReferencePolicy, WiringConfig, WiringError};

const LOG_ENV: &str = "FORMWIRE_LOG";
const POLICY_ENV: &str = "FORMWIRE_MALFORMED_REFERENCES";

/// Formwire dependency wiring tools.
#[derive(Parser)]
#[command(name = "formwire", about = "Form dependency wiring tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Wire a compiled form and print its dependency edges.
    Wire {
        /// Path to the compiled form JSON.
        form: PathBuf,

        /// Wiring configuration JSON.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Wire a compiled form and print an evaluation order.
    Order {
        /// Path to the compiled form JSON.
        form: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Materialize collection iterations in a request overlay and print the
    /// overlay edges.
    Iterate {
        /// Path to the compiled form JSON.
        form: PathBuf,

        /// Code of the collection to iterate.
        #[arg(long)]
        collection: String,

        /// Number of iterations to materialize.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// A failed command: message for stderr plus the process exit code.
struct Failure {
    exit_code: i32,
    message: String,
}

impl Failure {
    fn io(message: impl Into<String>) -> Self {
        Failure {
            exit_code: 3,
            message: message.into(),
        }
    }

    fn wiring(message: impl Into<String>) -> Self {
        Failure {
            exit_code: 1,
            message: message.into(),
        }
    }
}

impl From<WiringError> for Failure {
    fn from(err: WiringError) -> Self {
        match err {
            WiringError::ConfigIo { .. } => Failure::io(err.to_string()),
            other => Failure::wiring(other.to_string()),
        }
    }
}

impl From<RuntimeError> for Failure {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Wiring(inner) => inner.into(),
            other => Failure::wiring(other.to_string()),
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Wire {
            form,
            config,
            format,
        } => run_wire(&form, config.as_deref(), format),
        Commands::Order {
            form,
            config,
            format,
        } => run_order(&form, config.as_deref(), format),
        Commands::Iterate {
            form,
            collection,
            count,
            config,
            format,
        } => run_iterate(&form, &collection, count, config.as_deref(), format),
    };

    if let Err(failure) = result {
        eprintln!("Error: {}", failure.message);
        process::exit(failure.exit_code);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the wiring config file (if any), then applies the environment
/// override of the malformed-reference policy.
fn load_config(path: Option<&Path>) -> Result<WiringConfig, Failure> {
    let mut config = match path {
        Some(path) => WiringConfig::from_path(path)?,
        None => WiringConfig::default(),
    };
    if let Ok(value) = std::env::var(POLICY_ENV) {
        config.malformed_references = value.parse::<MalformedReferencePolicy>()?;
    }
    Ok(config)
}

fn load_form(path: &Path) -> Result<CompiledForm, Failure> {
    let json = fs::read_to_string(path)
        .map_err(|e| Failure::io(format!("failed to read form '{}': {}", path.display(), e)))?;
    CompiledForm::from_json(&json)
        .map_err(|e| Failure::io(format!("failed to parse form '{}': {}", path.display(), e)))
}

fn print_json(value: &serde_json::Value) -> Result<(), Failure> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Failure::io(format!("failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Execute the wire subcommand.
fn run_wire(form_path: &Path, config: Option<&Path>, format: Format) -> Result<(), Failure> {
    let registry = FormRegistry::new(load_config(config)?);
    let registration = registry.register(load_form(form_path)?)?;
    let wired = &registration.form;

    match format {
        Format::Json => print_json(&json!({
            "form": wired.form.code,
            "fingerprint": registration.fingerprint.to_hex().to_string(),
            "report": wired.report,
            "edges": wired.graph.edges(),
        })),
        Format::Text => {
            println!(
                "form {}: {} step(s), {} pseudo-node(s), {} edge(s)",
                wired.form.code,
                wired.report.steps,
                wired.report.pseudo_nodes,
                wired.graph.edge_count()
            );
            for (module, stats) in &wired.report.modules {
                println!(
                    "  {:<7} producers={} consumers={}",
                    module, stats.producers, stats.consumers
                );
            }
            for edge in wired.graph.edges() {
                println!("{}", format_edge(&wired.form.nodes, edge));
            }
            Ok(())
        }
    }
}

/// Execute the order subcommand.
fn run_order(form_path: &Path, config: Option<&Path>, format: Format) -> Result<(), Failure> {
    let registry = FormRegistry::new(load_config(config)?);
    let registration = registry.register(load_form(form_path)?)?;
    let wired = &registration.form;
    let order = evaluation_order([&wired.graph]).map_err(|e| Failure::wiring(e.to_string()))?;

    match format {
        Format::Json => {
            let entries: Vec<_> = order
                .iter()
                .map(|&id| json!({ "id": id, "node": describe(&wired.form.nodes, id) }))
                .collect();
            print_json(&json!(entries))
        }
        Format::Text => {
            for id in order {
                println!("{:>5}  {}", id, describe(&wired.form.nodes, id));
            }
            Ok(())
        }
    }
}

/// Execute the iterate subcommand.
fn run_iterate(
    form_path: &Path,
    collection_code: &str,
    count: usize,
    config: Option<&Path>,
    format: Format,
) -> Result<(), Failure> {
    let registry = FormRegistry::new(load_config(config)?);
    let registration = registry.register(load_form(form_path)?)?;
    let mut request = registry.begin_request(&registration.form.form.code)?;
    let collection = request.collection_by_code(collection_code)?;

    let mut iterations = Vec::with_capacity(count);
    for index in 0..count {
        let iteration = request.materialize_iteration(collection, index)?;
        iterations.push(json!({
            "index": index,
            "node": iteration.node,
            "renamed": iteration.renamed,
            "pseudo_nodes": iteration.pseudo_nodes,
            "report": iteration.report,
        }));
    }

    let nodes = request.nodes();
    match format {
        Format::Json => print_json(&json!({
            "request": request.id().to_string(),
            "collection": collection,
            "iterations": iterations,
            "edges": request.overlay_graph().edges(),
        })),
        Format::Text => {
            println!(
                "request {}: {} iteration(s) of '{}', {} overlay node(s), {} overlay edge(s)",
                request.id(),
                count,
                collection_code,
                request.overlay_nodes().len(),
                request.overlay_graph().edge_count()
            );
            for edge in request.overlay_graph().edges() {
                println!("{}", format_edge(&nodes, edge));
            }
            Ok(())
        }
    }
}

fn format_edge(nodes: &dyn NodeSource, edge: &DependencyEdge) -> String {
    let mut line = format!(
        "{:>5}  {} -> {}  {:?}",
        edge.id,
        describe(nodes, edge.producer),
        describe(nodes, edge.consumer),
        edge.role
    );
    if let Some(property) = &edge.metadata.property {
        line.push_str(&format!(" [{}]", property));
    }
    line
}

/// Short human-readable label for a node.
fn describe(nodes: &dyn NodeSource, id: NodeId) -> String {
    let Some(node) = nodes.node(id) else {
        return format!("{} <missing>", id);
    };
    let label = match &node.kind {
        NodeKind::Pseudo(pseudo) => format!("{}({})", pseudo.kind, pseudo.key),
        NodeKind::Field(field) => format!("field {}", field.code),
        NodeKind::Reference(reference) => format!("ref {}", reference.path.join(".")),
        NodeKind::Function(function) => format!("fn {}", function.name),
        NodeKind::Collection(collection) => format!("collection {}", collection.code),
        NodeKind::Step(step) => format!("step {}", step.path),
        other => other.tag().to_string(),
    };
    format!("{} {}", id, label)
}
