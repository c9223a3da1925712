//! VERDICTION — Pari-Mutuel Verdict Market Ledger
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens (or creates) the SQLite ledger, optionally seeds demo cases,
//! and serves the HTTP API with graceful shutdown.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use verdiction::api::routes::ApiState;
use verdiction::config;
use verdiction::gateway::OpaqueTokenGateway;
use verdiction::ledger::notifier::PoolNotifier;
use verdiction::ledger::store::Store;
use verdiction::ledger::WagerLedger;
use verdiction::types::{Case, CaseStatus};
use verdiction::verdict::openai::OpenAiVerdictClient;
use verdiction::verdict::VerdictGenerator;

const BANNER: &str = r#"
__     _______ ____  ____ ___ ____ _____ ___ ___  _   _
\ \   / / ____|  _ \|  _ \_ _/ ___|_   _|_ _/ _ \| \ | |
 \ \ / /|  _| | |_) | | | | | |     | |  | | | | |  \| |
  \ V / | |___|  _ <| |_| | | |___  | |  | | |_| | |\  |
   \_/  |_____|_| \_\____/___\____| |_| |___\___/|_| \_|

  Pari-Mutuel Verdict Market Ledger
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        port = cfg.server.port,
        database = %cfg.database.url,
        max_wager = cfg.ledger.max_wager,
        starting_balance = cfg.ledger.starting_balance,
        "VERDICTION starting up"
    );

    // -- Open the ledger store -------------------------------------------

    let store = Store::connect(&cfg.database.url).await?;
    store.migrate().await?;

    if cfg.ledger.seed_demo_cases {
        seed_demo_cases(&store).await?;
    }

    // -- Initialise components -------------------------------------------

    let notifier = PoolNotifier::new();
    let ledger = WagerLedger::new(store.clone(), notifier.clone(), cfg.ledger.max_wager);

    // AI verdict generation is optional: without a key the endpoint
    // reports itself unconfigured instead of failing requests.
    let verdict: Option<Arc<dyn VerdictGenerator>> = if cfg.verdict.enabled {
        match config::AppConfig::resolve_env(&cfg.verdict.api_key_env) {
            Ok(api_key) => {
                info!(model = %cfg.verdict.model, "AI verdict generation enabled");
                Some(Arc::new(OpenAiVerdictClient::new(
                    api_key,
                    Some(cfg.verdict.model.clone()),
                    cfg.verdict.max_output_tokens,
                )?))
            }
            Err(e) => {
                warn!(error = %e, "No verdict API key — AI verdicts disabled");
                None
            }
        }
    } else {
        None
    };

    let state = Arc::new(ApiState {
        ledger,
        store,
        notifier,
        auth: Arc::new(OpaqueTokenGateway),
        verdict,
        starting_balance: cfg.ledger.starting_balance,
    });

    // -- Serve -----------------------------------------------------------

    verdiction::api::serve(state, cfg.server.port).await?;

    info!("Shutdown complete");
    Ok(())
}

/// A handful of open cases so a fresh database has something to wager on.
async fn seed_demo_cases(store: &Store) -> Result<()> {
    let now = Utc::now();
    let demo = [
        (1, "The People v. Crumbworth: the office fridge heist"),
        (2, "In re Pixel: did the cat delete the production database?"),
        (3, "State v. Morales: the disputed parking-spot mural"),
    ];
    for (id, title) in demo {
        store
            .upsert_case(&Case {
                id,
                title: title.to_string(),
                deadline: now + Duration::days(7),
                status: CaseStatus::Active,
            })
            .await?;
    }
    info!(count = demo.len(), "Seeded demo cases");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("verdiction=info"));

    let json_logging = std::env::var("VERDICTION_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}
