use std::sync::Arc;

use clap::{Parser, Subcommand};
use labelgate::config::ConfigError;
use labelgate::routes::NavigationError;
use labelgate::{
    ApiError, AuthError, ClientConfig, Credentials, NavigationGuard, Notice, NoticeSink, RouteTable, Router,
    SessionStore,
};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("not logged in; run `labelgate login` first")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "labelgate", about = "Session and route-guard client for the labeling service")]
struct Cli {
    #[arg(long, env = "LABELGATE_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "LABELGATE_TOKEN_FILE")]
    token_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange credentials for a token and load the identity.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "LABELGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Fetch the identity for the stored token.
    Whoami,
    /// Forget the stored token.
    Logout,
    /// Restore the persisted session and print it.
    Check,
    /// Run the route guard for a location.
    Navigate { location: String },
    /// Print the route table.
    Routes,
    /// Authenticated GET through the intercepting client.
    Get { path: String },
}

/// Prints notices the way a UI would toast them.
struct StderrNotices;

impl NoticeSink for StderrNotices {
    fn notify(&self, notice: Notice) {
        eprintln!("! {notice}");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(token_file) = cli.token_file {
        config.token_file = token_file;
    }

    tracing::debug!(base_url = %config.api_base_url, token_file = %config.token_file.display(), "client configured");
    let store = SessionStore::from_config(&config, Arc::new(StderrNotices))?;

    match cli.command {
        Command::Login { username, password } => {
            let user = store.login(&Credentials::new(username, password)).await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Whoami => {
            if !store.is_authenticated() {
                return Err(CliError::NotLoggedIn);
            }
            let user = store.fetch_user().await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Logout => {
            store.logout();
            println!("ok");
            Ok(())
        }
        Command::Check => {
            store.check_auth().await;
            let session = store.snapshot();
            print_json(&json!({
                "authenticated": session.token.is_some(),
                "user": session.user,
            }))
        }
        Command::Navigate { location } => run_navigate(&store, &config, &location).await,
        Command::Routes => print_json(&serde_json::to_value(RouteTable::default_app().records())?),
        Command::Get { path } => {
            let response = store.http().get(&path).await?;
            let value = serde_json::from_str::<Value>(&response.body).unwrap_or(Value::String(response.body));
            print_json(&value)
        }
    }
}

async fn run_navigate(store: &SessionStore, config: &ClientConfig, location: &str) -> Result<(), CliError> {
    let router = Router::new(RouteTable::default_app(), NavigationGuard::from_config(store.clone(), config));
    let landing = router.navigate(location).await?;
    let redirects: Vec<Value> = landing
        .redirects
        .iter()
        .map(|hop| json!({ "from": hop.from, "to": hop.to, "reason": hop.reason.as_str() }))
        .collect();
    print_json(&json!({
        "requested": landing.requested,
        "location": landing.location(),
        "route": landing.route.name,
        "params": landing.route.params,
        "redirects": redirects,
    }))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
