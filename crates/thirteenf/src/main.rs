mod cli;
mod spider;

// remote imports
use clap::Parser;
use cli::{Cli, Commands, TraceLevel};
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod};
use thirteenf_spider::Config;
use tracing::{debug, subscriber, trace, Level};
use tracing_subscriber::FmtSubscriber;

////////////////////////////////////////////////////////////////////////////

// preprocess the trace level
fn preprocess(trace_level: Level) -> anyhow::Result<()> {
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish();
    subscriber::set_global_default(my_subscriber)?;
    Ok(())
}

// build the postgres connection pool from DATABASE_URL
fn pg_pool(config: &Config) -> anyhow::Result<Pool> {
    trace!("creating postgres connection pool config");
    let mut pg_config = deadpool_postgres::Config::new();
    pg_config.url = Some(config.database_url()?.to_string());
    pg_config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = pg_config.create_pool(
        Some(deadpool_postgres::Runtime::Tokio1),
        tokio_postgres::NoTls,
    )?;
    debug!("postgres connection pool established");

    Ok(pool)
}

////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // set the trace level
    if let Some(trace_level) = cli.trace {
        preprocess(match trace_level {
            TraceLevel::DEBUG => Level::DEBUG,
            TraceLevel::ERROR => Level::ERROR,
            TraceLevel::INFO => Level::INFO,
            TraceLevel::TRACE => Level::TRACE,
            TraceLevel::WARN => Level::WARN,
        })?;
    }
    trace!("command line input recorded: {cli:?}");

    // if no trace level provided, use tui
    let tui = cli.trace.is_none();

    let config = Config::from_env()?;
    debug!("configuration loaded: {config:?}");

    // read cli inputs
    match cli.command {
        // `thirteenf download <year> <quarter> [--date D]...`
        Commands::Download {
            year,
            quarter,
            date,
        } => {
            spider::download(&config, year, quarter, date, tui).await?;
        }

        // `thirteenf unpack <year> <quarter> [--date D] [--delete-feeds]`
        Commands::Unpack {
            year,
            quarter,
            date,
            delete_feeds,
        } => spider::unpack(&config, year, quarter, date, delete_feeds, tui).await?,

        // `thirteenf to-database <year> <quarter> [--filename F]`
        Commands::ToDatabase {
            year,
            quarter,
            filename,
        } => {
            let pool = pg_pool(&config)?;
            spider::to_database(&pool, &config, year, quarter, filename, tui).await?
        }

        // `thirteenf inspect <path>`
        Commands::Inspect { path } => spider::inspect(&path)?,

        // `thirteenf run <year> <quarter> [--delete-feeds]`
        Commands::Run {
            year,
            quarter,
            delete_feeds,
        } => {
            let pool = pg_pool(&config)?;
            spider::run(&pool, &config, year, quarter, delete_feeds, tui).await?
        }
    }

    Ok(())
}
