//! Binary entry point for the nested-set administrative CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;

use std::error::Error;
use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use nested_set::{
    JournalMode, NestedSet, NestedSetError, Node, NodeFacts, NodeKey, Payload, Placement,
    ReadOptions, Synchronous, Value, VerifyReport,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    name = "nested-set",
    version,
    about = "Inspect and edit nested-set trees stored in SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "NESTED_SET_CONFIG",
        value_name = "FILE",
        help = "Path to the TOML config file"
    )]
    config: Option<PathBuf>,

    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, value_name = "DB", help = "SQLite database file")]
    db: Option<PathBuf>,

    #[arg(long, global = true, help = "Table holding the tree")]
    table: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "col1,col2",
        value_delimiter = ',',
        help = "Payload columns (overrides the config file)"
    )]
    payload: Option<Vec<String>>,

    #[arg(long, global = true, value_enum, help = "Synchronous mode override")]
    synchronous: Option<SynchronousArg>,

    #[arg(long, global = true, value_enum, help = "Journal mode override")]
    journal_mode: Option<JournalModeArg>,

    #[arg(long, global = true, help = "Busy timeout for competing writers (ms)")]
    busy_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create the tree table if it does not exist")]
    Init,

    #[command(about = "Insert a node relative to an existing one")]
    Insert(InsertCmd),

    #[command(about = "Delete a node and its whole subtree")]
    Delete {
        #[arg(value_name = "KEY")]
        key: i64,
    },

    #[command(about = "Show one node")]
    Node {
        #[arg(value_name = "KEY")]
        key: i64,
        #[command(flatten)]
        facts: FactArgs,
    },

    #[command(about = "List every node in preorder")]
    List {
        #[command(flatten)]
        facts: FactArgs,
    },

    #[command(about = "Show the chain from the root down to a node")]
    Ancestors {
        #[arg(value_name = "KEY")]
        key: i64,
    },

    #[command(about = "Show a node and all of its descendants")]
    Subtree {
        #[arg(value_name = "KEY")]
        key: i64,
    },

    #[command(about = "Check the interval invariants of the whole table")]
    Verify,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("placement")
        .required(true)
        .args(["root", "child_of", "left_of", "right_of"])
))]
struct InsertCmd {
    #[arg(long, help = "Insert the root of an empty tree")]
    root: bool,

    #[arg(long, value_name = "KEY", help = "Insert as the only child of KEY")]
    child_of: Option<i64>,

    #[arg(long, value_name = "KEY", help = "Insert immediately left of KEY")]
    left_of: Option<i64>,

    #[arg(long, value_name = "KEY", help = "Insert immediately right of KEY")]
    right_of: Option<i64>,

    #[arg(
        long = "set",
        value_name = "COLUMN=VALUE",
        value_parser = parse_assignment,
        help = "Payload value; integers, floats and `null` are typed, anything else is text"
    )]
    values: Vec<(String, Value)>,
}

impl InsertCmd {
    fn placement(&self) -> Placement {
        match (self.child_of, self.left_of, self.right_of) {
            (Some(key), _, _) => Placement::ChildOf(NodeKey(key)),
            (_, Some(key), _) => Placement::LeftOf(NodeKey(key)),
            (_, _, Some(key)) => Placement::RightOf(NodeKey(key)),
            _ => Placement::Root,
        }
    }
}

#[derive(Args, Debug, Default)]
struct FactArgs {
    #[arg(long, help = "Include the depth of each node")]
    depth: bool,

    #[arg(long, help = "Include the descendant count")]
    children: bool,

    #[arg(long, help = "Include the left-sibling flag")]
    lower: bool,

    #[arg(long, help = "Include the right-sibling flag")]
    upper: bool,

    #[arg(long, help = "Include every derived fact")]
    all_facts: bool,
}

impl From<&FactArgs> for ReadOptions {
    fn from(args: &FactArgs) -> Self {
        if args.all_facts {
            return ReadOptions::all();
        }
        ReadOptions {
            depth: args.depth,
            child_count: args.children,
            lower_siblings: args.lower,
            upper_siblings: args.upper,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SynchronousArg {
    Full,
    Normal,
    Off,
}

impl From<SynchronousArg> for Synchronous {
    fn from(value: SynchronousArg) -> Self {
        match value {
            SynchronousArg::Full => Synchronous::Full,
            SynchronousArg::Normal => Synchronous::Normal,
            SynchronousArg::Off => Synchronous::Off,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum JournalModeArg {
    Wal,
    Delete,
}

impl From<JournalModeArg> for JournalMode {
    fn from(value: JournalModeArg) -> Self {
        match value {
            JournalModeArg::Wal => JournalMode::Wal,
            JournalModeArg::Delete => JournalMode::Delete,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            let tree_err = err.downcast_ref::<NestedSetError>();
            if tree_err.is_some_and(NestedSetError::is_busy) {
                eprintln!("hint: another writer holds the lock; raise --busy-timeout-ms");
            }
            let missing = tree_err.is_some_and(NestedSetError::is_not_found);
            std::process::exit(if missing { 3 } else { 1 });
        }
    }
}

fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    debug!(
        config_path = config.path().map(|p| p.display().to_string()),
        "cli.config.loaded"
    );

    let db_path = config.database_path(cli.open.db.clone())?;
    let opts = config.store_options(
        cli.open.synchronous,
        cli.open.journal_mode,
        cli.open.busy_timeout_ms,
    )?;
    let schema = config
        .schema_builder(cli.open.table.clone(), cli.open.payload.clone())?
        .build()?;
    let mut tree = NestedSet::open(&db_path, schema, &opts)?;

    match cli.command {
        Command::Init => {
            println!(
                "Table '{}' ready in {} ({} nodes)",
                tree.schema().table(),
                db_path.display(),
                tree.len()?
            );
        }
        Command::Insert(cmd) => {
            let payload: Payload = cmd.values.iter().cloned().collect();
            let key = tree.insert(cmd.placement(), &payload)?;
            let node = tree.simple_node(key)?;
            emit(&cli.format, &node, |_| {
                if let Some(node) = &node {
                    println!("Inserted {}", describe(node));
                }
            })?;
        }
        Command::Delete { key } => {
            let removed = tree.delete_subtree(NodeKey(key))?;
            emit(
                &cli.format,
                &serde_json::json!({ "key": key, "removed": removed }),
                |_| println!("Deleted {removed} node(s)"),
            )?;
        }
        Command::Node { key, facts } => {
            let Some(row) = tree.read_node(NodeKey(key), (&facts).into())? else {
                eprintln!("node {key} not found");
                return Ok(3);
            };
            emit(&cli.format, &row, |_| print_facts(&row))?;
        }
        Command::List { facts } => {
            let rows = tree.read_all_nodes((&facts).into())?;
            emit(&cli.format, &rows, |_| rows.iter().for_each(print_facts))?;
        }
        Command::Ancestors { key } => {
            let chain = tree.parent_chain(NodeKey(key))?;
            if chain.is_empty() {
                eprintln!("node {key} not found");
                return Ok(3);
            }
            emit(&cli.format, &chain, |_| print_nodes(&chain))?;
        }
        Command::Subtree { key } => {
            let nodes = tree.subtree(NodeKey(key))?;
            if nodes.is_empty() {
                eprintln!("node {key} not found");
                return Ok(3);
            }
            emit(&cli.format, &nodes, |_| print_nodes(&nodes))?;
        }
        Command::Verify => {
            let report = tree.verify()?;
            emit(&cli.format, &report, |_| print_verify_text(&report))?;
            if !report.success {
                return Ok(2);
            }
        }
    }

    Ok(0)
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{raw}'"))?;
    if column.is_empty() {
        return Err(format!("missing column name in '{raw}'"));
    }
    let value = if value.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(int) = value.parse::<i64>() {
        Value::Integer(int)
    } else if let Ok(float) = value.parse::<f64>() {
        Value::Real(float)
    } else {
        Value::Text(value.to_string())
    };
    Ok((column.to_string(), value))
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn describe(node: &Node) -> String {
    let mut line = format!(
        "{} [{}, {}]",
        node.key, node.bounds.left, node.bounds.right
    );
    for (column, value) in &node.payload {
        line.push_str(&format!(" {column}={value}"));
    }
    line
}

fn print_nodes(nodes: &[Node]) {
    for node in nodes {
        println!("{}", describe(node));
    }
}

fn print_facts(row: &NodeFacts) {
    let indent = "  ".repeat(row.depth.unwrap_or(0).max(0) as usize);
    let mut line = format!("{indent}{}", describe(&row.node));
    if let Some(depth) = row.depth {
        line.push_str(&format!(" depth={depth}"));
    }
    if let Some(children) = row.child_count {
        line.push_str(&format!(" children={children}"));
    }
    if let Some(lower) = row.lower_siblings {
        line.push_str(&format!(" lower={lower}"));
    }
    if let Some(upper) = row.upper_siblings {
        line.push_str(&format!(" upper={upper}"));
    }
    println!("{line}");
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify => success={} nodes={} roots={} max_depth={}",
        report.success, report.counts.nodes, report.counts.roots, report.counts.max_depth,
    );
    for finding in &report.findings {
        match finding.key {
            Some(key) => println!("- {:?} (node {key}): {}", finding.severity, finding.message),
            None => println!("- {:?}: {}", finding.severity, finding.message),
        }
    }
    if report.truncated {
        println!("- further findings omitted");
    }
}
