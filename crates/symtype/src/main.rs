use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use symtype_core::executor::{InlineExecutor, StoreExecutor};
use symtype_core::provider::MemoryStore;
use symtype_core::types::{ModuleBase, SymTag, TypeId, TypeKey};
use symtype_core::{EngineConfig, Session};
use symtype_utils::{info, init_with_config, LogConfig, LogFormat, LogLevel};

/// Inspect debugger type information and synthetic types.
#[derive(Parser, Debug)]
#[command(name = "symtype")]
#[command(version)]
#[command(about = "Inspect debugger type information and synthetic types", long_about = None)]
struct Cli
{
    /// JSON symbol fixture to serve type queries from
    #[arg(short, long, global = true, env = "SYMTYPE_FIXTURE")]
    fixture: Option<PathBuf>,
    /// Debugging session (process) handle
    #[arg(short, long, global = true, default_value = "1", value_parser = parse_u64)]
    process: u64,
    /// Module base address (hex format: 0x400000 or decimal)
    #[arg(short, long, global = true, default_value = "0x400000", value_parser = parse_u64)]
    module: u64,
    /// Run store calls on the calling thread instead of a worker thread
    #[arg(long, global = true, default_value_t = false)]
    inline: bool,
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Query one type record of an expected kind
    Query
    {
        /// Type id (hex or decimal)
        #[arg(value_parser = parse_u32)]
        id: u32,
        /// Expected kind (udt, enum, pointer_type, array_type, data, ...)
        #[arg(short, long, default_value = "udt", value_parser = parse_tag)]
        kind: SymTag,
    },
    /// Show the symbol tag of a type id
    Tag
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
    },
    /// List the child ids of a type
    Children
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
        /// Children count, if already known
        #[arg(short, long)]
        count: Option<u32>,
    },
    /// List the arguments of a function type
    Args
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
    },
    /// List the named values of an enum
    Enumerands
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
        /// Declared enum size in bytes (default: the enum's own length)
        #[arg(short, long)]
        size: Option<u64>,
    },
    /// List the data members of a user-defined type
    Members
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
    },
    /// Size of a type in bytes, following typedefs
    Size
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
    },
    /// Create a synthetic pointer to a type and query it back
    Pointer
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
    },
    /// Create a synthetic array of a type and query it back
    Array
    {
        #[arg(value_parser = parse_u32)]
        id: u32,
        /// Number of elements
        #[arg(short, long)]
        count: u32,
    },
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match log_config(&cli).and_then(|config| init_with_config(&config).map_err(Into::into)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn log_config(cli: &Cli) -> Result<LogConfig, Box<dyn Error>>
{
    let mut config = LogConfig::from_env()?;
    if cli.log_level.is_some() {
        config.level = cli.log_level;
    }
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>>
{
    let store = match &cli.fixture {
        Some(path) => MemoryStore::from_path(path)?,
        None => return Err("no symbol fixture given (use --fixture or SYMTYPE_FIXTURE)".into()),
    };
    let config = EngineConfig::from_env()?;

    let output = if cli.inline {
        let session = Session::new(InlineExecutor::new(store), config);
        let output = execute(&session, cli);
        session.shutdown();
        output?
    } else {
        info!(worker = %config.worker_name, "starting symbol worker");
        let session = Session::with_worker(store, config)?;
        let output = execute(&session, cli);
        session.shutdown();
        output?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn execute<X: StoreExecutor>(session: &Session<X>, cli: &Cli) -> Result<Value, Box<dyn Error>>
{
    let module = ModuleBase::new(cli.module);
    let key = |id: u32| session.key(cli.process, module, TypeId::new(id));
    let engine = session.engine();

    let output = match &cli.command {
        Commands::Query { id, kind } => serde_json::to_value(engine.query(key(*id)?, *kind)?)?,
        Commands::Tag { id } => json!({ "id": id, "tag": engine.symbol_tag(key(*id)?)? }),
        Commands::Children { id, count } => serde_json::to_value(engine.query_children(key(*id)?, *count)?)?,
        Commands::Args { id } => serde_json::to_value(engine.function_arguments(key(*id)?)?)?,
        Commands::Enumerands { id, size } => {
            let key = key(*id)?;
            let size = match size {
                Some(size) => *size,
                None => engine.query_enum(key)?.length,
            };
            serde_json::to_value(engine.enumerands(key, size, None)?)?
        }
        Commands::Members { id } => serde_json::to_value(engine.udt_members(key(*id)?)?)?,
        Commands::Size { id } => json!({ "id": id, "size": engine.type_size(key(*id)?)? }),
        Commands::Pointer { id } => {
            let pointer = session.pointer_to(key(*id)?)?;
            synthetic_output(session, pointer, SymTag::PointerType)?
        }
        Commands::Array { id, count } => {
            let array = session.array_of(key(*id)?, *count)?;
            synthetic_output(session, array, SymTag::ArrayType)?
        }
    };
    Ok(output)
}

fn synthetic_output<X: StoreExecutor>(session: &Session<X>, key: TypeKey, kind: SymTag)
    -> Result<Value, Box<dyn Error>>
{
    let result = session.engine().query(key, kind)?;
    Ok(json!({
        "id": key.id,
        "record": session.registry().get(key)?,
        "query": result,
    }))
}

/// Parse a number in hex (`0x` prefix) or decimal.
fn parse_u64(s: &str) -> Result<u64, String>
{
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn parse_u32(s: &str) -> Result<u32, String>
{
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("{s} does not fit in 32 bits"))
}

/// Parse a symbol tag by its snake_case name (`udt`, `pointer_type`, ...).
fn parse_tag(s: &str) -> Result<SymTag, String>
{
    serde_json::from_value(Value::String(s.to_lowercase())).map_err(|_| format!("unknown symbol tag {s:?}"))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_numbers()
    {
        assert_eq!(parse_u64("0x400000").unwrap(), 0x40_0000);
        assert_eq!(parse_u64("4096").unwrap(), 4096);
        assert!(parse_u64("0xZZ").is_err());
        assert_eq!(parse_u32("0x80000001").unwrap(), 0x8000_0001);
        assert!(parse_u32("0x100000000").is_err());
    }

    #[test]
    fn test_parse_tag()
    {
        assert_eq!(parse_tag("udt").unwrap(), SymTag::Udt);
        assert_eq!(parse_tag("Pointer_Type").unwrap(), SymTag::PointerType);
        assert!(parse_tag("struct").is_err());
    }

    #[test]
    fn test_cli_parses_query()
    {
        let cli = Cli::parse_from(["symtype", "--module", "0x1000", "query", "0x2", "--kind", "enum"]);
        assert_eq!(cli.module, 0x1000);
        assert_eq!(cli.process, 1);
        assert!(matches!(cli.command, Commands::Query { id: 2, kind: SymTag::Enum }));
    }

    #[test]
    fn test_fixture_session_end_to_end()
    {
        let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/shapes.json");
        let cli = Cli::parse_from(["symtype", "--inline", "--fixture", fixture, "members", "2"]);
        let store = MemoryStore::from_path(cli.fixture.as_deref().unwrap()).unwrap();
        let session = Session::new(InlineExecutor::new(store), EngineConfig::default());

        let members = execute(&session, &cli).unwrap();
        let names: Vec<_> = members
            .as_array()
            .unwrap()
            .iter()
            .map(|member| member["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["x", "y"]);

        let cli = Cli::parse_from(["symtype", "--fixture", fixture, "pointer", "2"]);
        let pointer = execute(&session, &cli).unwrap();
        assert_eq!(pointer["record"]["kind"], "pointer");
        assert_eq!(pointer["query"]["info"]["length"], 8);
        assert_eq!(session.shutdown(), 1);
    }
}
