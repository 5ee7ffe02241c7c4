use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use stacksync::{
    parse_rows, ImportConfig, ParserStrategy, ReconciliationEngine, RunSummary, SqliteStore,
};

struct CliArgs {
    csv_path: PathBuf,
    db_path: PathBuf,
    config: ImportConfig,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut positional = Vec::new();
    let mut config = ImportConfig::default();
    let mut json = false;

    for arg in &args[1..] {
        match arg.as_str() {
            "--create-missing" => config.create_missing = true,
            "--lookup-confirmed" => config.strategy = ParserStrategy::LookupConfirmed,
            "--require-site" => config.require_site = true,
            "--json" => json = true,
            flag if flag.starts_with("--") => bail!("unknown flag: {}", flag),
            _ => positional.push(arg.clone()),
        }
    }

    if positional.len() != 2 {
        bail!(
            "usage: stacksync <stacks.csv> <inventory.db> \
             [--create-missing] [--lookup-confirmed] [--require-site] [--json]"
        );
    }

    Ok(CliArgs {
        csv_path: PathBuf::from(&positional[0]),
        db_path: PathBuf::from(&positional[1]),
        config,
        json,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(2);
        }
    };

    let summary = run_import(&cli)?;

    if cli.json {
        // Machine-readable summary on stdout, nothing else
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n{}", summary.render());
        if summary.has_drift() {
            println!("⚠️  Drift detected - review mismatches above (nothing was corrected)");
        } else if !summary.has_errors() {
            println!("🎉 Inventory is in sync: {}", summary.digest());
        }
    }

    if summary.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_import(cli: &CliArgs) -> Result<RunSummary> {
    let chatty = !cli.json;
    if chatty {
        println!("🔄 StackSync v{} - Inventory Reconciliation", stacksync::VERSION);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // 1. Load the stack export
    if chatty {
        println!("\n📂 Loading stack export...");
    }
    let csv_text = read_csv(&cli.csv_path)?;
    let parsed = parse_rows(&csv_text)?;
    if chatty {
        println!(
            "✓ Parsed {} rows into {} device groups ({} malformed)",
            parsed.total_rows,
            parsed.groups.len(),
            parsed.warnings.len()
        );
    }

    // 2. Open the inventory store
    let store = SqliteStore::open(&cli.db_path)?;
    if chatty {
        println!("\n🔧 Database ready at {}", cli.db_path.display());
    }

    // 3. Reconcile every group
    if chatty {
        println!("\n🔍 Reconciling {} groups...", parsed.groups.len());
    }
    let engine = ReconciliationEngine::new(&store, cli.config.clone());
    let outcomes = engine.run(&parsed.groups);

    let mut summary = RunSummary::new();
    summary.record_warnings(&parsed.warnings);
    for outcome in &outcomes {
        summary.absorb(outcome);
    }
    summary.finish();

    Ok(summary)
}

fn read_csv(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("CSV file not found: {}", path.display());
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

// ============================================================================
// TESTS
// ============================================================================
