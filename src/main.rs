use std::fs::{self, OpenOptions};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use arboard::Clipboard;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod api;
mod card;
mod client;
mod controller;
mod domain;
mod host;
mod inputter;
mod model;
mod query;
mod row;
mod screens;
mod settings;
mod ui;

use api::{ApiClient, RowQuery, RowsQuery, SearchQuery, UpdateRow};
use card::FAVORITE_MARKER;
use client::{BaseUrlConfig, DEFAULT_API_URL, compose_base_url, extract_host, extract_port};
use controller::Controller;
use domain::{AppConfig, WSError};
use host::{DEFAULT_DIST_DIR, DEFAULT_STATIC_PORT, StaticHost};
use model::{Model, Status};
use query::Dispatcher;
use row::{FieldValue, MEET_FIELD, Row, RowId};
use settings::{DEFAULT_SETTINGS_PATH, JsonFileStore, MemoryStore, SettingsStore, expand_path};
use ui::AppUI;

const DEFAULT_LOG_FILE: &str = "~/.config/wordsearch/wordsearch.log";

#[derive(Debug, Parser)]
#[command(name = "wordsearch", version)]
#[command(about = "Browse, search and bookmark rows of a wordsearch service")]
struct Cli {
    /// Settings file holding the api base url
    #[arg(long, env = "WORDSEARCH_SETTINGS", default_value = DEFAULT_SETTINGS_PATH)]
    settings: String,
    /// Log file of the interactive screens
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: String,
    /// Keep settings in memory only
    #[arg(long)]
    ephemeral: bool,
    /// Key polling interval of the interactive screens in milliseconds
    #[arg(long, value_name = "MS")]
    poll_time: Option<u64>,
    /// Rows per page on the Data screen
    #[arg(long)]
    page_size: Option<u32>,
    /// Rows scanned for favorites
    #[arg(long)]
    favorites_page_size: Option<u32>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive Data and Favoritte screens (default)
    Tui,
    /// Serve the pre-built web bundle on 127.0.0.1
    Serve {
        #[arg(long, default_value = DEFAULT_DIST_DIR)]
        dist: String,
        #[arg(long, env = "ELECTRON_STATIC_PORT", default_value_t = DEFAULT_STATIC_PORT)]
        port: u16,
        /// Log every request
        #[arg(long, env = "ELECTRON_DEBUG")]
        debug: bool,
    },
    #[command(subcommand)]
    Config(ConfigCommand),
    #[command(flatten)]
    Api(ApiCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective base url
    Show,
    SetUrl { url: String },
    SetHost { host: String, port: String },
}

/// One-shot calls printing the response as JSON.
#[derive(Debug, Subcommand)]
enum ApiCommand {
    Health,
    Tables,
    Rows {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        #[command(flatten)]
        scope: Scope,
    },
    Row {
        id: String,
        #[command(flatten)]
        scope: Scope,
    },
    Search {
        q: String,
        #[command(flatten)]
        scope: Scope,
    },
    /// Write fields of a row
    Update {
        id: String,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
        #[command(flatten)]
        scope: Scope,
    },
    /// Mark a row as favorite, or unmark it with --off
    Favorite {
        id: String,
        #[arg(long)]
        off: bool,
        #[command(flatten)]
        scope: Scope,
    },
}

#[derive(Debug, Args)]
struct Scope {
    #[arg(long)]
    table: Option<String>,
    #[arg(long)]
    date: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        let mut cfg = AppConfig::default();
        if let Some(poll_time) = self.poll_time {
            cfg = cfg.event_poll_time(poll_time);
        }
        if let Some(page_size) = self.page_size {
            cfg = cfg.browse_page_size(page_size);
        }
        if let Some(page_size) = self.favorites_page_size {
            cfg = cfg.favorites_page_size(page_size);
        }
        cfg
    }
}

fn run(cli: Cli) -> Result<(), WSError> {
    let cfg = cli.app_config();
    let command = cli.command.unwrap_or(Command::Tui);
    let log_file = match command {
        Command::Tui => Some(cli.log_file.as_str()),
        _ => None,
    };
    init_tracing(log_file)?;

    let store: Arc<dyn SettingsStore> = if cli.ephemeral {
        Arc::new(MemoryStore::default())
    } else {
        let file_store = JsonFileStore::open_expanded(&cli.settings)?;
        info!("Settings at {}", file_store.path().display());
        Arc::new(file_store)
    };
    let base_url = BaseUrlConfig::new(store, DEFAULT_API_URL);

    match command {
        Command::Tui => run_tui(&cfg, base_url),
        Command::Serve { dist, port, debug } => {
            let dist = expand_path(&dist)?;
            let runtime = Runtime::new()?;
            runtime.block_on(async {
                let listener = host::bind(port).await?;
                host::run(listener, StaticHost::new(dist, debug)).await
            })
        }
        Command::Config(cmd) => run_config(cmd, &base_url),
        Command::Api(cmd) => {
            base_url.hydrate_api_base_url();
            let api = ApiClient::new(base_url.endpoint());
            Runtime::new()?.block_on(run_api(&api, cmd))
        }
    }
}

/// Logs go to `log_file` when given, else to stderr.
fn init_tracing(log_file: Option<&str>) -> Result<(), WSError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(ErrorLayer::default());
    match log_file {
        Some(raw) => {
            let path = expand_path(raw)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

fn run_tui(cfg: &AppConfig, base_url: BaseUrlConfig) -> Result<(), WSError> {
    info!("Starting wordsearch!");
    let runtime = Runtime::new()?;
    let (sender, mut inbox) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(
        runtime.handle().clone(),
        ApiClient::new(base_url.endpoint()),
        sender,
    );
    let clipboard = match Clipboard::new() {
        Ok(clipboard) => Some(clipboard),
        Err(e) => {
            warn!("Clipboard unavailable: {e}");
            None
        }
    };
    let mut model = Model::init(cfg, base_url, clipboard);
    let mut ui = AppUI::new();
    let controller = Controller::new(cfg);

    let mut terminal = ratatui::init();
    let result = (|| -> Result<(), WSError> {
        while model.status != Status::Quitting {
            for request in model.take_requests() {
                dispatcher.dispatch(request);
            }

            // Render the current view
            terminal.draw(|f| ui.draw(&model, f))?;

            // Apply finished requests, then at most one key event
            while let Ok(message) = inbox.try_recv() {
                model.update(message);
            }
            if let Some(message) = controller.handle_event(&model)? {
                model.update(message);
            }
        }
        Ok(())
    })();
    ratatui::restore();
    runtime.shutdown_background();
    result
}

fn run_config(cmd: ConfigCommand, base_url: &BaseUrlConfig) -> Result<(), WSError> {
    match cmd {
        ConfigCommand::Show => {
            let url = base_url.get_api_base_url();
            print_json(&json!({
                "api_base_url": url,
                "default_api_url": DEFAULT_API_URL,
                "host": extract_host(&url),
                "port": extract_port(&url),
            }))
        }
        ConfigCommand::SetUrl { url } => print_json(&base_url.set_api_base_url(&url)),
        ConfigCommand::SetHost { host, port } => {
            print_json(&base_url.set_api_base_url(&compose_base_url(&host, &port)))
        }
    }
}

async fn run_api(api: &ApiClient, cmd: ApiCommand) -> Result<(), WSError> {
    match cmd {
        ApiCommand::Health => print_json(&api.health().await?),
        ApiCommand::Tables => print_json(&api.tables().await?),
        ApiCommand::Rows {
            limit,
            offset,
            scope,
        } => {
            let query = RowsQuery {
                limit,
                offset,
                table: scope.table,
                date: scope.date,
            };
            print_json(&api.rows(&query).await?)
        }
        ApiCommand::Row { id, scope } => {
            let query = RowQuery {
                id: parse_row_id(&id),
                table: scope.table,
                date: scope.date,
            };
            print_json(&api.row(&query).await?)
        }
        ApiCommand::Search { q, scope } => {
            let query = SearchQuery {
                q,
                table: scope.table,
                date: scope.date,
            };
            print_json(&api.search(&query).await?)
        }
        ApiCommand::Update { id, set, scope } => {
            let update = UpdateRow {
                id: parse_row_id(&id),
                data: parse_assignments(&set)?,
                table: scope.table,
                date: scope.date,
            };
            print_json(&api.update_row(&update).await?)
        }
        ApiCommand::Favorite { id, off, scope } => {
            let meet = if off { "" } else { FAVORITE_MARKER };
            let update = UpdateRow {
                id: parse_row_id(&id),
                data: Row::new().with(MEET_FIELD, meet),
                table: scope.table,
                date: scope.date,
            };
            print_json(&api.update_row(&update).await?)
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<(), WSError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Integer ids are sent as numbers, anything else as text.
fn parse_row_id(raw: &str) -> RowId {
    match raw.parse::<i64>() {
        Ok(number) => RowId::from(number),
        Err(_) => RowId::from(raw),
    }
}

fn parse_assignments(assignments: &[String]) -> Result<Row, WSError> {
    assignments.iter().try_fold(Row::new(), |row, assignment| {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| WSError::invalid_argument(format!("expected KEY=VALUE, got {assignment:?}")))?;
        if key.is_empty() {
            return Err(WSError::invalid_argument(format!("empty key in {assignment:?}")));
        }
        Ok(row.with(key, FieldValue::from(value)))
    })
}
