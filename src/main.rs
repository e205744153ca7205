use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use syndicate::api::{AdminOrderQuery, ApiClient, ApiError};
use syndicate::callback::{CallbackHandler, CallbackOutcome, CallbackParams, run_callback};
use syndicate::config::{CallbackProtocol, Config, ConfigError};
use syndicate::currency::{CURRENCIES, CurrencyError, CurrencyPreference};
use syndicate::navigate::Navigator;
use syndicate::notify::{Notice, Notifier};
use syndicate::session::{RestoreOutcome, SessionManager};
use syndicate::storage::{FileStorage, StorageError};
use syndicate::types::{CharacterClass, NewOrder, OrderPatch, OrderStatus, ServiceType};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Currency(#[from] CurrencyError),
    #[error("invalid callback URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not signed in; run `syndicate login` first")]
    NotSignedIn,
    #[error("{0} requires the booster or admin role")]
    Forbidden(&'static str),
    #[error("authentication failed: {0}")]
    CallbackFailed(String),
}

#[derive(Parser, Debug)]
#[command(name = "syndicate", about = "Rival Syndicate storefront session client")]
struct Cli {
    /// Backend origin.
    #[arg(long, env = "SYNDICATE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Session file.
    #[arg(long, env = "SYNDICATE_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Callback wire contract: `direct-token` or `code-exchange`.
    #[arg(long, env = "SYNDICATE_CALLBACK_PROTOCOL")]
    protocol: Option<CallbackProtocol>,

    /// Re-check the stored token with the backend before running the command.
    #[arg(long, env = "SYNDICATE_VALIDATE_ON_RESTORE")]
    validate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the URL that starts Discord sign-in.
    Login,
    /// Complete sign-in from the URL the provider redirected to.
    Callback { url: String },
    /// Show the signed-in user.
    Whoami,
    Logout,
    Orders(OrdersCommand),
    Admin(AdminCommand),
    Catalogue(CatalogueCommand),
    Currency(CurrencyCommand),
}

#[derive(Args, Debug)]
struct OrdersCommand {
    #[command(subcommand)]
    command: OrdersSubcommand,
}

#[derive(Subcommand, Debug)]
enum OrdersSubcommand {
    List,
    Show {
        order_id: String,
    },
    Create {
        #[arg(long)]
        service: ServiceType,
        #[arg(long)]
        character_id: String,
        #[arg(long)]
        character_name: String,
        #[arg(long)]
        class: CharacterClass,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "paypal")]
        payment_method: String,
    },
    Update {
        order_id: String,
        #[arg(long)]
        status: Option<OrderStatus>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        progress: Option<u8>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        booster_id: Option<String>,
        #[arg(long)]
        eta: Option<String>,
    },
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    Orders {
        #[arg(long)]
        status: Option<OrderStatus>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Boosters,
}

#[derive(Args, Debug)]
struct CatalogueCommand {
    #[command(subcommand)]
    command: CatalogueSubcommand,
}

#[derive(Subcommand, Debug)]
enum CatalogueSubcommand {
    Services,
    Characters { class: CharacterClass },
}

#[derive(Args, Debug)]
struct CurrencyCommand {
    #[command(subcommand)]
    command: CurrencySubcommand,
}

#[derive(Subcommand, Debug)]
enum CurrencySubcommand {
    List,
    Show,
    Set { code: String },
}

// =============================================================================
// CONSOLE SEAMS
// =============================================================================

/// The terminal has no browser: print where the user should go.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, target: &str) {
        println!("open: {target}");
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            eprintln!("error: {notice}");
        } else {
            println!("{notice}");
        }
    }
}

// =============================================================================
// MAIN
// =============================================================================

struct Context {
    config: Config,
    api: ApiClient,
    session: SessionManager<FileStorage>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = cli.backend_url.filter(|u| !u.trim().is_empty()) {
        config.backend_url = url.trim().trim_end_matches('/').to_owned();
    }
    if let Some(path) = cli.state_file.filter(|p| !p.as_os_str().is_empty()) {
        config.state_file = path;
    }
    if let Some(protocol) = cli.protocol {
        config.callback_protocol = protocol;
    }
    config.validate_on_restore |= cli.validate;

    let api = ApiClient::from_config(&config)?;
    let storage = FileStorage::open(&config.state_file)?;
    tracing::debug!(backend = %api.base_url(), state_file = %storage.path().display(), "client configured");
    let session = SessionManager::new(storage, api.login_url());
    let ctx = Context { config, api, session };

    let restored = if ctx.config.validate_on_restore {
        ctx.session.restore_and_validate(&ctx.api).await
    } else {
        ctx.session.restore()
    };
    tracing::debug!(?restored, "session ready");
    if restored == RestoreOutcome::Revoked {
        eprintln!("stored session was rejected by the backend; signed out");
    }

    match cli.command {
        Command::Login => {
            ctx.session.login(&PrintNavigator);
            Ok(())
        }
        Command::Callback { url } => run_callback_command(&ctx, &url).await,
        Command::Whoami => run_whoami(&ctx),
        Command::Logout => {
            ctx.session.logout();
            println!("signed out");
            Ok(())
        }
        Command::Orders(orders) => run_orders(&ctx, orders).await,
        Command::Admin(admin) => run_admin(&ctx, admin).await,
        Command::Catalogue(catalogue) => run_catalogue(&ctx, catalogue).await,
        Command::Currency(currency) => run_currency(&ctx, currency),
    }
}

async fn run_callback_command(ctx: &Context, url: &str) -> Result<(), CliError> {
    let params = CallbackParams::from_url(url)?;
    let handler =
        CallbackHandler::new(params, ctx.config.callback_protocol).with_timeout(ctx.config.callback_timeout());
    let outcome = run_callback(&handler, &ctx.session, &ctx.api, &ConsoleNotifier, &PrintNavigator).await;
    match outcome {
        CallbackOutcome::Failed(failure) => Err(CliError::CallbackFailed(failure.message().to_owned())),
        CallbackOutcome::NothingToProcess => {
            eprintln!("callback URL carried nothing to process");
            Ok(())
        }
        CallbackOutcome::Success { .. } | CallbackOutcome::AlreadyHandled => Ok(()),
    }
}

fn run_whoami(ctx: &Context) -> Result<(), CliError> {
    let snapshot = ctx.session.snapshot();
    let Some(user) = snapshot.user.as_ref().filter(|_| snapshot.is_authenticated()) else {
        return Err(CliError::NotSignedIn);
    };
    println!("{} ({})", user.display_name(), user.role);
    print_json(user)
}

fn bearer(ctx: &Context) -> Result<String, CliError> {
    if !ctx.session.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }
    ctx.session.access_token().ok_or(CliError::NotSignedIn)
}

/// Run an authenticated call; a rejected token signs the session out.
async fn authed<T>(ctx: &Context, result: impl Future<Output = Result<T, ApiError>>) -> Result<T, CliError> {
    match result.await {
        Err(e) if e.is_unauthorized() => {
            ctx.session.logout();
            Err(e.into())
        }
        other => Ok(other?),
    }
}

async fn run_orders(ctx: &Context, orders: OrdersCommand) -> Result<(), CliError> {
    let token = bearer(ctx)?;
    match orders.command {
        OrdersSubcommand::List => print_json(&authed(ctx, ctx.api.my_orders(&token)).await?),
        OrdersSubcommand::Show { order_id } => print_json(&authed(ctx, ctx.api.order(&token, &order_id)).await?),
        OrdersSubcommand::Create { service, character_id, character_name, class, icon, price, payment_method } => {
            let order = NewOrder {
                service_type: service,
                character_id,
                character_name,
                character_class: class,
                character_icon: icon,
                price,
                payment_method,
            };
            print_json(&authed(ctx, ctx.api.create_order(&token, &order)).await?)
        }
        OrdersSubcommand::Update { order_id, status, progress, notes, booster_id, eta } => {
            if !ctx.session.is_booster() {
                return Err(CliError::Forbidden("orders update"));
            }
            let patch = OrderPatch { status, progress, notes, booster_id, eta };
            print_json(&authed(ctx, ctx.api.update_order(&token, &order_id, &patch)).await?)
        }
    }
}

async fn run_admin(ctx: &Context, admin: AdminCommand) -> Result<(), CliError> {
    let token = bearer(ctx)?;
    if !ctx.session.is_booster() {
        return Err(CliError::Forbidden("admin"));
    }
    match admin.command {
        AdminSubcommand::Orders { status, page, limit } => {
            let query = AdminOrderQuery { status, page, limit };
            print_json(&authed(ctx, ctx.api.admin_orders(&token, query)).await?)
        }
        AdminSubcommand::Boosters => print_json(&authed(ctx, ctx.api.admin_boosters(&token)).await?),
    }
}

async fn run_catalogue(ctx: &Context, catalogue: CatalogueCommand) -> Result<(), CliError> {
    match catalogue.command {
        CatalogueSubcommand::Services => print_json(&ctx.api.services().await?),
        CatalogueSubcommand::Characters { class } => print_json(&ctx.api.characters(class).await?),
    }
}

fn run_currency(ctx: &Context, currency: CurrencyCommand) -> Result<(), CliError> {
    ctx.session.with_storage(|storage| -> Result<(), CliError> {
        let mut pref = CurrencyPreference::load(&*storage);
        match currency.command {
            CurrencySubcommand::List => {
                let current = pref.current().code;
                for c in &CURRENCIES {
                    let marker = if c.code == current { "*" } else { " " };
                    println!("{marker} {:<4} {:<4} {}", c.code, c.symbol, c.name);
                }
            }
            CurrencySubcommand::Show => {
                let c = pref.current();
                println!("{} {} ({})", c.symbol, c.code, c.name);
            }
            CurrencySubcommand::Set { code } => {
                let c = pref.select(storage, &code)?;
                println!("currency set to {} {}", c.symbol, c.code);
            }
        }
        Ok(())
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
