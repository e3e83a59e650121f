use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use smartdt::config::ConfigError;
use smartdt::net::catalog::{CatalogClient, CatalogResource, CulturalAttraction, Hotel, PhysicalAttraction};
use smartdt::net::rest::RestClient;
use smartdt::store::{self, StoreKey};
use smartdt::{
    ApiError, ClientConfig, Credentials, HttpAuthApi, Navigator, RegistrationData, Route, RouteGuard, SecretStore,
    Session, SessionError, SessionManager, User,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid login credentials")]
    RejectedCredentials,
    #[error(transparent)]
    Session(SessionError),
    #[error("not signed in; run `smartdt login` first")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<SessionError> for CliError {
    fn from(error: SessionError) -> Self {
        if error.is_rejected_credentials() { Self::RejectedCredentials } else { Self::Session(error) }
    }
}

#[derive(Parser, Debug)]
#[command(name = "smartdt", about = "SmartDT travel client")]
struct Cli {
    /// Overrides the backend root from the environment.
    #[arg(long, env = "SMARTDT_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh SMARTDT_STORE_KEY for the encrypted file backend.
    Keygen,
    #[command(flatten)]
    Backend(BackendCommand),
}

/// Commands that talk to the backend or the credential store.
#[derive(Subcommand, Debug)]
enum BackendCommand {
    /// Sign in and store the credential record.
    Login {
        #[arg(long)]
        login: String,
        #[arg(long, env = "SMARTDT_PASSWORD")]
        password: String,
    },
    /// Create a user and account, then sign in.
    Register(RegisterArgs),
    /// Sign out and clear stored credentials.
    Logout,
    /// Restore the stored session and print it.
    Whoami,
    /// Re-fetch the signed-in user.
    Refresh,
    Hotels(CatalogCommand),
    Culturals(CatalogCommand),
    Physicals(CatalogCommand),
    /// Print where the route guard would send the restored session from `path`.
    Guard { path: String },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "SMARTDT_PASSWORD")]
    password: String,
    #[arg(long)]
    date_of_birth: Option<String>,
}

#[derive(Args, Debug)]
struct CatalogCommand {
    #[command(subcommand)]
    command: CatalogSubcommand,
}

#[derive(Subcommand, Debug)]
enum CatalogSubcommand {
    List,
    Get { id: i64 },
}

#[derive(Serialize)]
struct SessionView<'a> {
    user: Option<&'a User>,
    is_authenticated: bool,
    is_loading: bool,
}

impl<'a> From<&'a Session> for SessionView<'a> {
    fn from(session: &'a Session) -> Self {
        Self { user: session.user.as_ref(), is_authenticated: session.is_authenticated, is_loading: session.is_loading }
    }
}

/// Navigator for a one-shot check: it only remembers where it was sent.
struct PrintingNavigator {
    current: Mutex<String>,
}

impl Navigator for PrintingNavigator {
    fn current(&self) -> Route {
        Route::new(&self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    fn replace(&self, path: &str) {
        *self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = path.to_owned();
    }
}

type Manager = SessionManager<HttpAuthApi, Box<dyn SecretStore>>;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Keygen => {
            println!("{}", StoreKey::generate().to_hex());
            Ok(())
        }
        Command::Backend(command) => run_backend(cli.base_url, command).await,
    }
}

async fn run_backend(base_url: Option<String>, command: BackendCommand) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = base_url {
        tracing::debug!(%base_url, "base url overridden");
        config.base_url = base_url.trim_end_matches('/').to_owned();
    }
    tracing::debug!(base_url = %config.base_url, store = ?config.store_backend, "config loaded");

    let rest = RestClient::new(&config)?;
    let api = HttpAuthApi::from_rest(rest.clone());
    let manager: Manager = SessionManager::new(api, store::open(&config));

    match command {
        BackendCommand::Login { login, password } => {
            manager.login(&Credentials::new(login, password)).await?;
            print_session(&manager.snapshot())
        }
        BackendCommand::Register(args) => {
            let data = RegistrationData {
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                password: args.password,
                date_of_birth: args.date_of_birth,
            };
            manager.register(&data).await?;
            print_session(&manager.snapshot())
        }
        BackendCommand::Logout => {
            manager.logout().await?;
            print_session(&manager.snapshot())
        }
        BackendCommand::Whoami => {
            manager.restore().await;
            print_session(&manager.snapshot())
        }
        BackendCommand::Refresh => {
            manager.restore().await;
            if !manager.snapshot().is_authenticated {
                return Err(CliError::NotSignedIn);
            }
            manager.refresh_user().await;
            print_session(&manager.snapshot())
        }
        BackendCommand::Hotels(cmd) => run_catalog::<Hotel>(rest, cmd).await,
        BackendCommand::Culturals(cmd) => run_catalog::<CulturalAttraction>(rest, cmd).await,
        BackendCommand::Physicals(cmd) => run_catalog::<PhysicalAttraction>(rest, cmd).await,
        BackendCommand::Guard { path } => {
            manager.restore().await;
            let navigator = PrintingNavigator { current: Mutex::new(path) };
            let redirect = RouteGuard::default().enforce(&manager.snapshot(), &navigator);
            print_json(&serde_json::json!({
                "redirect": redirect.map(|r| r.to),
                "location": navigator.current().path(),
            }))
        }
    }
}

async fn run_catalog<R>(rest: RestClient, cmd: CatalogCommand) -> Result<(), CliError>
where
    R: CatalogResource + Serialize,
{
    let client = CatalogClient::<R>::new(rest);
    let value = match cmd.command {
        CatalogSubcommand::List => serde_json::to_value(client.list().await?)?,
        CatalogSubcommand::Get { id } => serde_json::to_value(client.get(id).await?)?,
    };
    print_json(&value)
}

fn print_session(session: &Session) -> Result<(), CliError> {
    print_json(&serde_json::to_value(SessionView::from(session))?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
