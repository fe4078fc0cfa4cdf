use clap::{Parser, Subcommand, builder::styling};
use db_to_redshift::{
    Config, CopyStatement, Delimiter,
    cli::{check_connections, read_query, render_statement, run_export},
    config::{Overrides, load_destination},
};
use eyre::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Stream a query result from a database through S3 into Redshift
#[derive(Parser)]
#[command(name = "db2redshift", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source settings from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Per-run overrides of environment settings
#[derive(clap::Args)]
struct OverrideArgs {
    /// Object key to stage to (overrides S3_KEY)
    #[arg(short, long)]
    key: Option<String>,

    /// Target table, optionally schema-qualified (overrides REDSHIFT_TABLE)
    #[arg(short, long)]
    table: Option<String>,

    /// Field delimiter, a single character or "\t" (overrides CSV_DELIMITER)
    #[arg(short, long)]
    delimiter: Option<Delimiter>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and load its result into Redshift
    Run {
        /// The query to run against the source database
        query: Option<String>,

        /// Read the query from a file instead
        #[arg(short, long, conflicts_with = "query")]
        file: Option<PathBuf>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Print the COPY statement a run would execute, without connecting
    Statement {
        /// Show credentials instead of masking them
        #[arg(long)]
        reveal: bool,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Test connectivity to the source, Redshift, and the staging bucket
    Check,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            key: args.key,
            table: args.table,
            delimiter: args.delimiter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Settings may come from the environment alone
    if let Err(e) = dotenvy::from_filename(&cli.env) {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::Run {
            query,
            file,
            overrides,
        } => {
            let query = read_query(query, file.as_deref())?;
            let config = Config::from_env_with(&overrides.into())?;

            log::info!(
                "Exporting into {} via {}",
                config.target.cyan(),
                config.destination.object_uri().bright_black()
            );
            let report = run_export(&config, &query).await?;
            log::debug!("Executed: {}", report.statement);
        }
        Commands::Statement { reveal, overrides } => {
            let (destination, target) = load_destination(&overrides.into())?;
            target.validate()?;
            destination.validate()?;

            let statement = CopyStatement::new(&target, &destination);
            println!("{}", render_statement(&statement, reveal));
        }
        Commands::Check => {
            log::info!("Checking connections");
            let config = Config::from_env()?;
            check_connections(&config).await?;
            log::info!("{}", "All connections OK".green());
        }
    }

    Ok(())
}
