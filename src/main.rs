use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use content_reliability::config::AppConfig;
use content_reliability::db::entity_store::{EntityStore, PgEntityStore};
use content_reliability::db::{self, reliability_queries};
use content_reliability::models::entity::{ContentEntity, EntityModel};
use content_reliability::models::reliability::ScoreContext;
use content_reliability::reliability::{checksum, persister, scorer, weights};

/// Pause between recalculation batches so a full re-score does not
/// monopolize the database.
const BATCH_SIZE: usize = 10;
const BATCH_PAUSE_MS: u64 = 100;

#[derive(Parser)]
#[command(
    name = "content-reliability",
    about = "Reliability scoring and audit log verification for content entities"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recalculate reliability scores for entities of a model
    Recalc {
        /// Entity model (articles, tags, products)
        model: EntityModel,

        /// Single entity to re-score
        #[arg(long, conflicts_with = "all")]
        id: Option<Uuid>,

        /// Re-score every entity of the model
        #[arg(long)]
        all: bool,

        /// Maximum entities processed in one run
        #[arg(long, default_value_t = 100)]
        limit: i64,

        /// Entities to skip before processing starts
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Recompute audit log checksums and report mismatches
    VerifyLogs {
        /// Entity model (articles, tags, products)
        model: EntityModel,

        /// Verify only one entity's log entries
        #[arg(long, conflicts_with = "all")]
        id: Option<Uuid>,

        /// Verify the most recent entries across the whole model
        #[arg(long)]
        all: bool,

        /// Maximum log entries verified in one run
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let pool = match db::init_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(error) => {
            eprintln!("Failed to connect to database: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = db::run_migrations(&pool).await {
        eprintln!("Failed to run migrations: {error}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Recalc {
            model,
            id,
            all,
            limit,
            offset,
        } => recalc(&pool, model, id, all, limit, offset).await,
        Command::VerifyLogs {
            model,
            id,
            all,
            limit,
        } => verify_logs(&pool, model, id, all, limit).await,
    }
}

async fn recalc(
    pool: &PgPool,
    model: EntityModel,
    id: Option<Uuid>,
    all: bool,
    limit: i64,
    offset: i64,
) -> ExitCode {
    let store = PgEntityStore::new(pool.clone());

    let entities: Vec<ContentEntity> = if let Some(id) = id {
        match store.get(model, id).await {
            Ok(Some(entity)) => vec![entity],
            Ok(None) => {
                eprintln!("No {model} entity with id {id}");
                return ExitCode::FAILURE;
            }
            Err(error) => {
                eprintln!("Failed to load entity: {error}");
                return ExitCode::FAILURE;
            }
        }
    } else if all {
        match store.list(model, limit, offset).await {
            Ok(entities) => entities,
            Err(error) => {
                eprintln!("Failed to list entities: {error}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        eprintln!("Specify either --id <uuid> or --all");
        return ExitCode::FAILURE;
    };

    let stats = reliability_queries::field_stats(pool, &model.to_string())
        .await
        .unwrap_or_default();
    let rules = weights::rules_for(model);
    let context = ScoreContext {
        source: "cli".to_string(),
        message: "Score recalculated".to_string(),
        ..ScoreContext::default()
    };

    let mut processed = 0u64;
    let mut errors = 0u64;
    for (index, entity) in entities.iter().enumerate() {
        let result = scorer::score_entity(&entity.fields, rules, &stats);
        if persister::persist_final_score(pool, &model.to_string(), entity.id, &result, &context)
            .await
        {
            processed += 1;
        } else {
            errors += 1;
        }

        if (index + 1) % BATCH_SIZE == 0 {
            sleep(Duration::from_millis(BATCH_PAUSE_MS)).await;
        }
    }

    println!("Recalculated {model}: {processed} processed, {errors} errors");
    if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn verify_logs(
    pool: &PgPool,
    model: EntityModel,
    id: Option<Uuid>,
    all: bool,
    limit: i64,
) -> ExitCode {
    let model_name = model.to_string();
    let entries = if let Some(id) = id {
        reliability_queries::logs_for(pool, &model_name, id, limit).await
    } else if all {
        reliability_queries::recent_logs(pool, &model_name, limit).await
    } else {
        eprintln!("Specify either --id <uuid> or --all");
        return ExitCode::FAILURE;
    };

    let entries = match entries {
        Ok(entries) => entries,
        Err(error) => {
            eprintln!("Failed to load log entries: {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut verified = 0u64;
    let mut mismatches = 0u64;
    for entry in &entries {
        if checksum::verify_entry(entry) {
            verified += 1;
        } else {
            mismatches += 1;
            eprintln!(
                "Checksum mismatch: log {} ({} {}, written {})",
                entry.id, entry.model, entry.foreign_key, entry.created
            );
        }
    }

    println!(
        "Verified {model}: {verified} intact, {mismatches} mismatches, {} total",
        entries.len()
    );
    if mismatches > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
