//! Wrangler CLI - migrate, check and run directive recipes
//!
//! # Commands
//!
//! ```bash
//! wrangler migrate recipe.txt              # Rewrite a V1 recipe in the V2 grammar
//! wrangler check recipe.txt                # Parse and initialize every directive
//! wrangler run recipe.txt input.csv        # Apply a recipe to a CSV file
//! wrangler directives                      # List directive signatures
//! ```
//!
//! Logging goes to stderr; `-v`, `-vv` and `-vvv` raise the level, and
//! `RUST_LOG` overrides it.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wrangler::grammar::{MigrateToV2, MigrationOptions, RecipeParser};
use wrangler::ingest::{read_file_auto, write_records};
use wrangler::{all_signatures, DirectiveConfig, DirectiveRegistry, ExecutorOptions, Pipeline};

#[derive(Parser)]
#[command(name = "wrangler")]
#[command(about = "Migrate, check and run data preparation recipes", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a recipe in the canonical V2 grammar
    Migrate {
        /// Recipe file, one directive per line
        recipe: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop at the first line that cannot be migrated
        #[arg(long)]
        fail_fast: bool,

        /// Directive configuration (exclusions and aliases) as JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a recipe and initialize every directive without running it
    Check {
        /// Recipe file
        recipe: PathBuf,

        /// Directive configuration as JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Apply a recipe to the records of a CSV file
    Run {
        /// Recipe file
        recipe: PathBuf,

        /// Input CSV file (encoding and delimiter auto-detected)
        input: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write diverted records as JSON to this file
        #[arg(short, long)]
        errors: Option<PathBuf>,

        /// Directive configuration as JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run stateless steps over record partitions in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// List known directives with their usage
    Directives {
        /// Directive configuration as JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Migrate {
            recipe,
            output,
            fail_fast,
            config,
        } => cmd_migrate(&recipe, output.as_deref(), fail_fast, config.as_deref()),

        Commands::Check { recipe, config } => cmd_check(&recipe, config.as_deref()),

        Commands::Run {
            recipe,
            input,
            output,
            errors,
            config,
            parallel,
        } => cmd_run(
            &recipe,
            &input,
            output.as_deref(),
            errors.as_deref(),
            config.as_deref(),
            parallel,
        ),

        Commands::Directives { config } => cmd_directives(config.as_deref()),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

type CmdResult = Result<bool, Box<dyn std::error::Error>>;

fn load_config(path: Option<&Path>) -> Result<DirectiveConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            let config = DirectiveConfig::from_file(p)?;
            eprintln!(
                "   Config: {} exclusion(s), {} alias(es)",
                config.exclusions.len(),
                config.aliases.len()
            );
            Ok(config)
        }
        None => Ok(DirectiveConfig::default()),
    }
}

fn cmd_migrate(recipe: &Path, output: Option<&Path>, fail_fast: bool, config: Option<&Path>) -> CmdResult {
    eprintln!("📄 Migrating: {}", recipe.display());
    let config = load_config(config)?;

    let content = fs::read_to_string(recipe)?;
    let lines: Vec<&str> = content.lines().collect();

    let report = MigrateToV2::new(config)
        .with_options(MigrationOptions { fail_fast })
        .migrate_report(&lines)?;

    let failures = report.failures();
    for failure in &failures {
        eprintln!("   ❌ {}", failure);
    }

    let mut text = report.output().join("\n");
    text.push('\n');
    write_output(&text, output)?;

    if failures.is_empty() {
        eprintln!("✅ Migrated {} of {} lines", report.migrated_count(), lines.len());
        Ok(true)
    } else {
        eprintln!("⚠️  {} line(s) could not be migrated and were copied as written", failures.len());
        Ok(false)
    }
}

fn cmd_check(recipe: &Path, config: Option<&Path>) -> CmdResult {
    eprintln!("🔍 Checking: {}", recipe.display());
    let config = load_config(config)?;

    let content = fs::read_to_string(recipe)?;
    let parsed = RecipeParser::new(&config).parse(&content)?;
    let pipeline = Pipeline::new(&parsed, &DirectiveRegistry::with_builtins())?;

    for step in &parsed.steps {
        println!("{:>4}  {}", step.line, step.directive.to_v2());
    }
    eprintln!("✅ {} directive(s) ready", pipeline.len());
    Ok(true)
}

fn cmd_run(
    recipe: &Path,
    input: &Path,
    output: Option<&Path>,
    errors: Option<&Path>,
    config: Option<&Path>,
    parallel: bool,
) -> CmdResult {
    eprintln!("📄 Processing: {}", input.display());
    let config = load_config(config)?;

    let data = read_file_auto(input)?;
    eprintln!("   Encoding: {}", data.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(data.delimiter));
    eprintln!("   Rows: {}", data.records.len());
    eprintln!("   Columns: {}", data.headers.join(", "));

    let content = fs::read_to_string(recipe)?;
    let pipeline = Pipeline::from_text(&content, &config, &DirectiveRegistry::with_builtins())?.with_options(
        ExecutorOptions {
            parallel,
            ..ExecutorOptions::default()
        },
    );
    eprintln!("\n⚙️  Recipe: {} step(s)", pipeline.len());

    let result = pipeline.execute(data.records);
    for step in &result.steps {
        eprintln!(
            "   [{}] {}: {} → {} ({} diverted, {} ms)",
            step.line, step.directive, step.input, step.output, step.diverted, step.elapsed_ms
        );
    }

    let mut buffer = Vec::new();
    write_records(&mut buffer, &result.records, data.delimiter)?;
    write_output(&String::from_utf8(buffer)?, output)?;

    if let Some(path) = errors {
        fs::write(path, serde_json::to_string_pretty(&result.errors)?)?;
        eprintln!("💾 {} error record(s) written to: {}", result.errors.len(), path.display());
    } else if !result.errors.is_empty() {
        eprintln!("   ⚠️  {} record(s) diverted to the error stream", result.errors.len());
    }

    if let Some(fatal) = &result.fatal {
        eprintln!("\n❌ {}", fatal);
        return Ok(false);
    }

    eprintln!("\n✨ {}", result.summary());
    Ok(true)
}

fn cmd_directives(config: Option<&Path>) -> CmdResult {
    let config = load_config(config)?;
    let registry = DirectiveRegistry::with_builtins();
    let aliases = config.reverse_aliases();

    for signature in all_signatures() {
        let mut notes = Vec::new();
        if config.is_excluded(signature.name) {
            notes.push("excluded".to_string());
        }
        if !registry.contains(signature.name) {
            notes.push("not executable".to_string());
        }
        if let Some(names) = aliases.get(signature.name) {
            notes.push(format!("aliases: {}", names.join(", ")));
        }

        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!("  [{}]", notes.join("; "))
        };
        println!("{}{}", signature.name, notes);
        println!("    {}", signature.description);
        for usage in signature.usages() {
            println!("    {}", usage);
        }
    }
    Ok(true)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
