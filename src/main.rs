// src/main.rs
// Thin CLI over the orchestrator: wire up the store and the pluggable
// clients, run one query (or a store inspection command), print JSON.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use provider_research::config::Config;
use provider_research::dedupe::{AddressPolicy, IdentityResolver};
use provider_research::interpreter::QueryInterpreter;
use provider_research::llm::{AnthropicClient, CompletionClient};
use provider_research::matcher::SemanticMatcher;
use provider_research::orchestrator::Orchestrator;
use provider_research::research::{NpiRegistryClient, RegistryClient, WebResearcher};
use provider_research::session::{Session, UserContext};
use provider_research::store::ProviderStore;
use provider_research::web::{
    BraveSearchClient, HttpFetcher, OfflineSearcher, WebSearcher,
};

#[derive(Parser)]
#[command(name = "provider-research", version, about = "Provider record research pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a natural-language query to provider records
    Query {
        /// The query text, e.g. "Find Home Instead in Boston, MA"
        text: String,

        /// Caller location as "City, ST", used for "near me"
        #[arg(long)]
        location: Option<String>,

        /// Save newly researched locations into the database
        #[arg(long)]
        auto_save: bool,

        /// Treat different suite numbers as distinct locations when
        /// checking duplicates
        #[arg(long)]
        suites_distinct: bool,
    },

    /// Print database statistics
    Stats,

    /// Print the change history for a provider
    History {
        /// Provider id
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let level: Level = config.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let pool = SqlitePoolOptions::new()
        .max_connections(config.sqlite_max_connections)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(ProviderStore::new(pool));
    store.init_schema().await?;

    match cli.command {
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::History { id } => {
            let history = store.get_history(id).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Query {
            text,
            location,
            auto_save,
            suites_distinct,
        } => {
            let llm: Option<Arc<dyn CompletionClient>> =
                match AnthropicClient::from_env(&config) {
                    Some(client) => Some(Arc::new(client)),
                    None => {
                        warn!("ANTHROPIC_API_KEY not set; using rule-based interpretation only");
                        None
                    }
                };

            let searcher: Arc<dyn WebSearcher> = match BraveSearchClient::from_env(&config) {
                Some(client) => Arc::new(client),
                None => {
                    warn!("BRAVE_SEARCH_API_KEY not set; web research will find no sources");
                    Arc::new(OfflineSearcher)
                }
            };

            let fetcher = Arc::new(HttpFetcher::new(&config)?);
            let registry: Arc<dyn RegistryClient> = Arc::new(NpiRegistryClient::new(&config)?);

            let policy = if suites_distinct {
                AddressPolicy::SuitesAreDistinct
            } else {
                AddressPolicy::SameBuildingIsSameEntity
            };

            let researcher = WebResearcher::new(
                llm.clone(),
                searcher,
                fetcher,
                Some(registry),
                IdentityResolver::new(policy, llm.clone()),
                config.research_max_urls,
            );

            let orchestrator = Orchestrator::new(
                config.clone(),
                store,
                QueryInterpreter::new(llm.clone()),
                SemanticMatcher::new(llm.clone()),
                researcher,
                IdentityResolver::new(policy, llm),
                auto_save,
            );

            let mut session = Session::new(UserContext {
                location,
                previous_searches: Vec::new(),
            });

            info!(query = %text, "processing");
            let result = orchestrator.process(&text, &mut session).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
