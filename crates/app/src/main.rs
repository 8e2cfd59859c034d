use clap::Parser;
use engine::{CacheRefresh, EngineError, ErrorKind};
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod cli;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = cli::Cli::parse();
    let mut settings = settings::Settings::new(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        settings.database = database;
    }
    if let Some(level) = cli.level {
        settings.level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "splitledger={level},engine={level},migration={level}",
            level = settings.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let db = parse_database(&settings.database()).await?;
    let cache_refresh = if settings.background_cache_refresh {
        CacheRefresh::Background
    } else {
        CacheRefresh::Inline
    };
    let engine = engine::Engine::builder()
        .database(db)
        .cache_refresh(cache_refresh)
        .build()
        .await?;

    match cli::run(&engine, cli.command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => match err.downcast::<EngineError>() {
            Ok(engine_err) => {
                let kind = engine_err.kind();
                let body = serde_json::json!({
                    "error": kind,
                    "message": engine_err.public_message(),
                });
                eprintln!("{}", serde_json::to_string_pretty(&body)?);
                std::process::exit(exit_code_for(kind));
            }
            Err(other) => Err(other),
        },
    }
}

fn exit_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Forbidden => 4,
        ErrorKind::Conflict => 5,
        ErrorKind::Consistency | ErrorKind::Internal => 1,
    }
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    tracing::debug!("connecting to {}", config.url());
    let database = sea_orm::Database::connect(config.url()).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
