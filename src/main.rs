//! milvusctl CLI Entry Point
//!
//! Subcommands:
//! - `database` - create, describe, list, drop, alter, drop-properties, use
//! - `collection` - create, describe, list, drop, alter, drop-properties
//! - `profile` - save and list connection profiles
//!
//! All output to stdout is JSON-only. Logs go to stderr.
//! Every value passed on the command line is a template, so `{{ env.NAME }}` and
//! `{{ inputs.NAME }}` (with `--var NAME=value`) are resolved before connecting.

use anyhow::{anyhow, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use milvusctl::config::{config_path, load_with_precedence, ConfigLocation};
use milvusctl::{
    execute_reported, list_profiles, resolve_profile, save_profile, AlterCollectionProperties,
    AlterDatabaseProperties, ConnectionParams, CreateCollection, CreateDatabase, DescribeCollection,
    DescribeDatabase, DropCollection, DropCollectionProperties, DropDatabase, DropDatabaseProperties,
    Envelope, ListCollections, ListDatabases, MilvusConnector, MilvusError, Operation, Property,
    RenderContext, StoredProfile, UseDatabase,
};

/// milvusctl - administrative control plane for Milvus
#[derive(Parser)]
#[command(name = "milvusctl")]
#[command(about = "Create, inspect, reconfigure and remove Milvus databases and collections")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Template variable, referenced as {{ inputs.KEY }} (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var, global = true)]
    vars: Vec<(String, String)>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Server URI, e.g. http://localhost:19530
    #[arg(long, global = true)]
    uri: Option<String>,

    /// API token (wins over --user/--password)
    #[arg(long, global = true)]
    token: Option<String>,

    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    /// Database the session starts in
    #[arg(long = "db", global = true)]
    db_name: Option<String>,

    /// Named connection profile (defaults to the configured default profile)
    #[arg(long, global = true)]
    profile: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Database administration
    #[command(subcommand)]
    Database(DatabaseCommand),

    /// Collection administration
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Connection profile management
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Subcommand)]
enum DatabaseCommand {
    /// Create a database
    Create {
        name: String,
        /// Properties as a JSON object
        #[arg(long)]
        properties: Option<String>,
    },
    /// Describe a database
    Describe { name: String },
    /// List databases
    List,
    /// Drop a database
    Drop { name: String },
    /// Set database properties
    Alter {
        name: String,
        /// Properties as a JSON object
        #[arg(long)]
        properties: String,
    },
    /// Reset database properties
    DropProperties {
        name: String,
        /// Property key to reset (repeatable)
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Switch the session database
    Use { name: String },
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// Create a collection
    Create(CreateCollectionArgs),
    /// Describe a collection
    Describe {
        name: String,
        #[arg(long = "in-db")]
        in_db: Option<String>,
    },
    /// List collections
    List {
        #[arg(long = "in-db")]
        in_db: Option<String>,
    },
    /// Drop a collection
    Drop {
        name: String,
        #[arg(long = "in-db")]
        in_db: Option<String>,
    },
    /// Set collection properties
    Alter {
        name: String,
        #[arg(long = "in-db")]
        in_db: Option<String>,
        /// Properties as a JSON object
        #[arg(long)]
        properties: String,
    },
    /// Remove collection properties
    DropProperties {
        name: String,
        #[arg(long = "in-db")]
        in_db: Option<String>,
        /// Property key to remove (repeatable)
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
}

#[derive(Args)]
struct CreateCollectionArgs {
    name: String,

    /// Target database, overriding the session database
    #[arg(long = "in-db")]
    in_db: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    dimension: Option<String>,

    #[arg(long)]
    primary_field: Option<String>,

    /// Int64 or VarChar
    #[arg(long)]
    id_type: Option<String>,

    #[arg(long)]
    max_length: Option<String>,

    #[arg(long)]
    vector_field: Option<String>,

    /// L2, IP or COSINE
    #[arg(long)]
    metric: Option<String>,

    #[arg(long)]
    auto_id: Option<String>,

    #[arg(long)]
    dynamic_field: Option<String>,

    #[arg(long)]
    shards: Option<String>,

    #[arg(long)]
    partitions: Option<String>,

    /// Strong, Session, Bounded or Eventually
    #[arg(long)]
    consistency: Option<String>,

    /// Custom schema as JSON, or @path to a JSON file
    #[arg(long)]
    schema: Option<String>,

    /// Index parameters as a JSON array, or @path to a JSON file
    #[arg(long)]
    index_params: Option<String>,

    /// Properties as a JSON object
    #[arg(long)]
    properties: Option<String>,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Save a connection profile
    Save {
        name: String,
        #[arg(long = "profile-uri")]
        profile_uri: String,
        /// Environment variable holding the token
        #[arg(long)]
        token_env: Option<String>,
        #[arg(long)]
        username: Option<String>,
        /// Environment variable holding the password
        #[arg(long)]
        password_env: Option<String>,
        #[arg(long = "profile-db")]
        profile_db: Option<String>,
        /// Save to the per-user config instead of .milvusctl/config.json
        #[arg(long)]
        global: bool,
    },
    /// List resolvable connection profiles
    List,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let fallback = match verbose {
        0 => "milvusctl=info",
        1 => "milvusctl=debug",
        _ => "milvusctl=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
        .context("failed to install log subscriber")
}

fn template(value: String) -> Property<String> {
    Property::Template(value)
}

fn templated<T>(value: Option<String>) -> Option<Property<T>> {
    value.map(Property::Template)
}

/// JSON argument given inline or as `@path`
fn json_arg<T>(value: Option<String>, field: &str) -> Result<Option<Property<T>>, MilvusError> {
    let Some(value) = value else {
        return Ok(None);
    };

    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(PathBuf::from(path))
            .map(|contents| Some(Property::Template(contents)))
            .map_err(|e| MilvusError::validation(field, format!("could not read {path}: {e}"))),
        None => Ok(Some(Property::Template(value))),
    }
}

/// Profile first, then explicit flags on top
fn connection_params(args: &ConnectionArgs) -> Result<ConnectionParams, MilvusError> {
    let mut params = if args.profile.is_none() && args.uri.is_some() {
        ConnectionParams::default()
    } else {
        resolve_profile(&load_with_precedence()?, args.profile.as_deref())?
    };

    if let Some(uri) = &args.uri {
        params.uri = template(uri.clone());
    }
    if let Some(token) = &args.token {
        params.token = Some(template(token.clone()));
    }
    if let Some(user) = &args.user {
        params.username = Some(template(user.clone()));
    }
    if let Some(password) = &args.password {
        params.password = Some(template(password.clone()));
    }
    if let Some(db_name) = &args.db_name {
        params.db_name = Some(template(db_name.clone()));
    }

    Ok(params)
}

async fn report<O: Operation>(
    operation: Result<O, MilvusError>,
    connector: &MilvusConnector,
    ctx: &RenderContext,
) -> Envelope {
    match operation {
        Ok(operation) => execute_reported(&operation, connector, ctx).await,
        Err(err) => Envelope::from_result::<()>(O::NAME, Err(err), 0),
    }
}

async fn run_database(
    command: DatabaseCommand,
    connection: Result<ConnectionParams, MilvusError>,
    connector: &MilvusConnector,
    ctx: &RenderContext,
) -> Envelope {
    match command {
        DatabaseCommand::Create { name, properties } => {
            let op = connection.map(|connection| CreateDatabase {
                connection,
                name: template(name),
                properties: templated(properties),
            });
            report(op, connector, ctx).await
        }
        DatabaseCommand::Describe { name } => {
            report(connection.map(|c| DescribeDatabase::new(c, template(name))), connector, ctx).await
        }
        DatabaseCommand::List => report(connection.map(ListDatabases::new), connector, ctx).await,
        DatabaseCommand::Drop { name } => {
            report(connection.map(|c| DropDatabase::new(c, template(name))), connector, ctx).await
        }
        DatabaseCommand::Alter { name, properties } => {
            let op = connection
                .map(|c| AlterDatabaseProperties::new(c, template(name), Property::Template(properties)));
            report(op, connector, ctx).await
        }
        DatabaseCommand::DropProperties { name, keys } => {
            let op =
                connection.map(|c| DropDatabaseProperties::new(c, template(name), Property::Value(keys)));
            report(op, connector, ctx).await
        }
        DatabaseCommand::Use { name } => {
            report(connection.map(|c| UseDatabase::new(c, template(name))), connector, ctx).await
        }
    }
}

async fn run_collection(
    command: CollectionCommand,
    connection: Result<ConnectionParams, MilvusError>,
    connector: &MilvusConnector,
    ctx: &RenderContext,
) -> Envelope {
    match command {
        CollectionCommand::Create(args) => {
            let op = connection.and_then(|connection| {
                Ok(CreateCollection {
                    connection,
                    collection_name: template(args.name),
                    db_name: templated(args.in_db),
                    description: templated(args.description),
                    dimension: templated(args.dimension),
                    primary_field_name: templated(args.primary_field),
                    id_type: templated(args.id_type),
                    max_length: templated(args.max_length),
                    vector_field_name: templated(args.vector_field),
                    auto_id: templated(args.auto_id),
                    schema: json_arg(args.schema, "schema")?,
                    index_params: json_arg(args.index_params, "indexParams")?,
                    metric_type: templated(args.metric),
                    enable_dynamic_field: templated(args.dynamic_field),
                    num_shards: templated(args.shards),
                    num_partitions: templated(args.partitions),
                    consistency_level: templated(args.consistency),
                    properties: templated(args.properties),
                })
            });
            report(op, connector, ctx).await
        }
        CollectionCommand::Describe { name, in_db } => {
            let op = connection.map(|c| DescribeCollection {
                db_name: templated(in_db),
                ..DescribeCollection::new(c, template(name))
            });
            report(op, connector, ctx).await
        }
        CollectionCommand::List { in_db } => {
            let op = connection.map(|c| ListCollections { db_name: templated(in_db), ..ListCollections::new(c) });
            report(op, connector, ctx).await
        }
        CollectionCommand::Drop { name, in_db } => {
            let op = connection
                .map(|c| DropCollection { db_name: templated(in_db), ..DropCollection::new(c, template(name)) });
            report(op, connector, ctx).await
        }
        CollectionCommand::Alter { name, in_db, properties } => {
            let op = connection.map(|c| AlterCollectionProperties {
                db_name: templated(in_db),
                ..AlterCollectionProperties::new(c, template(name), Property::Template(properties))
            });
            report(op, connector, ctx).await
        }
        CollectionCommand::DropProperties { name, in_db, keys } => {
            let op = connection.map(|c| DropCollectionProperties {
                db_name: templated(in_db),
                ..DropCollectionProperties::new(c, template(name), Property::Value(keys))
            });
            report(op, connector, ctx).await
        }
    }
}

fn run_profile(command: ProfileCommand) -> Envelope {
    match command {
        ProfileCommand::Save { name, profile_uri, token_env, username, password_env, profile_db, global } => {
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            let profile = StoredProfile {
                uri: profile_uri,
                token_env,
                username,
                password_env,
                db_name: profile_db,
                ..StoredProfile::default()
            };
            let result = config_path(location).and_then(|path| {
                save_profile(&path, &name, profile)?;
                Ok(json!({ "success": true, "profile": name, "path": path.display().to_string() }))
            });
            Envelope::from_result("save_profile", result, 0)
        }
        ProfileCommand::List => {
            let result = load_with_precedence().map(|registry| {
                let profiles: Vec<_> = list_profiles(&registry)
                    .into_iter()
                    .map(|(name, uri)| json!({ "name": name, "uri": uri }))
                    .collect();
                json!({ "profiles": profiles, "default": registry.default })
            });
            Envelope::from_result("list_profiles", result, 0)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let ctx = RenderContext::with_env().vars(cli.vars);
    let mut connector = MilvusConnector::new();
    if let Some(seconds) = cli.timeout {
        connector = connector.with_timeout(Duration::from_secs(seconds));
    }

    let envelope = match cli.command {
        Commands::Database(command) => {
            run_database(command, connection_params(&cli.connection), &connector, &ctx).await
        }
        Commands::Collection(command) => {
            run_collection(command, connection_params(&cli.connection), &connector, &ctx).await
        }
        Commands::Profile(command) => run_profile(command),
    };

    let encoded = serde_json::to_string(&envelope).context("failed to encode output envelope")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{encoded}").context("failed to write to stdout")?;
    stdout.flush().context("failed to flush stdout")?;

    if !envelope.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
