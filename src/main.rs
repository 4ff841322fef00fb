use anyhow::{ bail, Context };
use clap::{ Parser, Subcommand };
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };
use wallet_store::db::{ inspect_schema, DatabaseTarget, SessionContext };
use wallet_store::{ drop_database, setup_database, Settings };

#[derive(Parser, Debug)]
#[command(name = "wallet-store", about = "Create, verify or drop the wallet database named by DB_URL")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Create any missing tables (default)
    Setup,
    /// Delete the whole database
    Drop,
    /// Check that every table and column exists
    Verify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "wallet_store=info".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to load database settings")?;
    let target = DatabaseTarget::parse(&settings.db_url)?;

    match cli.command.unwrap_or(Command::Setup) {
        Command::Setup => {
            println!("Setting up database at {}", target.redacted());
            setup_database(&settings).await?;
            println!("Database ready");
        }
        Command::Drop => {
            println!("Dropping database at {}", target.redacted());
            drop_database(&settings).await?;
            println!("Database dropped");
        }
        Command::Verify => {
            let context = SessionContext::connect(settings).await?;
            let inspection = inspect_schema(context.connection(), context.dialect()).await;
            let target = context.target().clone();
            context.close().await?;
            let inspection = inspection?;

            for table in &inspection.missing_tables {
                println!("missing table: {}", table);
            }
            for (table, column) in &inspection.missing_columns {
                println!("missing column: {}.{}", table, column);
            }

            if !inspection.is_complete() {
                bail!("Database schema at {} is incomplete", target.redacted());
            }
            println!("Database schema at {} is complete", target.redacted());
        }
    }

    Ok(())
}
