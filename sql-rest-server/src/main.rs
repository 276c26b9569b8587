//! Standalone gateway server and admin CLI.

mod config;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use axum_sql_rest::auth::{policy, setup, Policy};
use axum_sql_rest::{Db, RestGateway};

use config::Config;

#[derive(Parser)]
#[command(
    name = "sql-rest-server",
    version,
    about = "Automatic REST API for PostgreSQL, MySQL and SQLite"
)]
struct Cli {
    /// Listen address, e.g. 0.0.0.0:3000
    #[arg(long, global = true)]
    addr: Option<String>,

    /// Database URL, e.g. sqlite://data.db or postgres://user@host/db
    #[arg(long = "db-url", global = true)]
    db_url: Option<String>,

    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Administrative commands against the auth tables
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Create the auth tables and bootstrap an admin account
    Setup,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Manage security policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// List user accounts
    List,
    /// Create a user account
    Add(AddUser),
}

#[derive(Args)]
struct AddUser {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// List security policies
    List,
    /// Create a security policy
    Add(AddPolicy),
}

#[derive(Args)]
struct AddPolicy {
    #[arg(long, default_value = "")]
    description: String,
    /// Table the policy applies to; "all" is the fallback for every table
    #[arg(long = "table")]
    table_name: String,
    /// One of create, read, update, delete, read_mine, all
    #[arg(long)]
    action: String,
    /// Policy expression, e.g. "user_id = auth_user.id"
    #[arg(long)]
    expression: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        config.addr = addr;
    }
    if let Some(db_url) = cli.db_url {
        config.db.url = db_url;
    }
    if config.db.url.is_empty() {
        bail!("no database url configured; pass --db-url or set db.url in the config file");
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Auth { command } => admin(config, command).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        addr = %config.addr,
        prefix = %config.prefix,
        auth = config.auth.enabled,
        "starting server"
    );

    let mut builder = RestGateway::builder(&config.db.url).prefix(&config.prefix);
    if config.auth.enabled {
        if config.auth.secret.is_empty() {
            bail!("auth.enabled requires auth.secret");
        }
        builder = builder.auth_secret(&config.auth.secret);
    }
    if config.cors.enabled {
        builder = builder.cors(config.cors.origins.clone());
    }
    let gateway = builder
        .connect()
        .await
        .context("failed to open database")?;

    let app = gateway.clone().into_router();
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.close();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

async fn admin(config: Config, command: AuthCommand) -> anyhow::Result<()> {
    let db = Db::open(&config.db.url).await?;

    match command {
        AuthCommand::Setup => {
            let (username, password) = setup::setup(&db).await?;
            println!("admin account created");
            println!("  username: {username}");
            println!("  password: {password}");
        }
        AuthCommand::User { command } => match command {
            UserCommand::List => {
                let users = db
                    .fetch("SELECT id, username, is_admin FROM auth_users", &[])
                    .await?;
                for user in users {
                    println!("{}", Value::Object(user));
                }
            }
            UserCommand::Add(add) => {
                setup::register_user(&db, &add.username, &add.password).await?;
                println!("user {} created", add.username);
            }
        },
        AuthCommand::Policy { command } => match command {
            PolicyCommand::List => {
                let policies = db
                    .fetch(
                        "SELECT id, description, table_name, action, expression FROM auth_policies",
                        &[],
                    )
                    .await?;
                for policy in policies {
                    println!("{}", Value::Object(policy));
                }
            }
            PolicyCommand::Add(add) => {
                policy::add_policy(
                    &db,
                    &Policy {
                        id: 0,
                        description: add.description,
                        table_name: add.table_name,
                        action: add.action,
                        expression: add.expression,
                    },
                )
                .await?;
                println!("policy created");
            }
        },
    }
    Ok(())
}
