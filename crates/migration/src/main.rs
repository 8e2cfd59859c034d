use sea_orm::Database;
use sea_orm_migration::prelude::*;

const USAGE: &str = "usage: migration [up [N] | down [N] | fresh | refresh | reset | status]";

fn database_url() -> String {
    std::env::var("DATABASE_URL")
        .or_else(|_| {
            std::env::var("SPLITLEDGER_DATABASE").map(|path| format!("sqlite:{path}?mode=rwc"))
        })
        .unwrap_or_else(|_| "sqlite:./splitledger.db?mode=rwc".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map_or("up", String::as_str);
    let steps = match args.get(1) {
        Some(raw) => Some(raw.parse::<u32>().map_err(|_| format!("invalid step count: {raw}"))?),
        None => None,
    };

    let db = Database::connect(database_url()).await?;

    match command {
        "up" => migration::Migrator::up(&db, steps).await?,
        "down" => migration::Migrator::down(&db, steps.or(Some(1))).await?,
        "fresh" => migration::Migrator::fresh(&db).await?,
        "refresh" => migration::Migrator::refresh(&db).await?,
        "reset" => migration::Migrator::reset(&db).await?,
        "status" => migration::Migrator::status(&db).await?,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
