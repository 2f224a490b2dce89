mod client;

use anyhow::{Context, Result};
use chorus_core::paths::plugin_source_dir;
use chorus_core::{init_logging, AppDirs, Config, SearchKind};
use chorus_server::{load_providers, start_server, AppContext};
use clap::{Parser, Subcommand};
use client::{parse_track, ChorusClient};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "chorus", version, about = "Music source aggregation service")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load plugins and serve the HTTP API
    Serve(ServeCommand),
    /// Provider management commands
    #[command(subcommand)]
    Providers(ProvidersCommand),
    /// Search one provider through a running server
    Search(SearchCommand),
    /// Resolve a playable URL for a track
    Play(TrackCommand),
    /// Fetch the best available lyric for a track
    Lyric(TrackCommand),
    /// Import a playlist by URL
    Import(ImportCommand),
}

#[derive(Debug, Subcommand)]
enum ProvidersCommand {
    /// List configured plugins and whether their source is cached
    List,
}

#[derive(Debug, Parser, Clone)]
struct ServeCommand {
    /// Bind address (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port (overrides server.port and CHORUS_PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Directory holding the web UI build
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
struct ServerArg {
    /// Base URL of a running server; defaults to the configured port on localhost
    #[arg(long)]
    server: Option<String>,
}

#[derive(Debug, Parser, Clone)]
struct SearchCommand {
    #[command(flatten)]
    server: ServerArg,
    /// Provider id
    #[arg(long)]
    source: String,
    /// Result page, starting at 1
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Result type: music, album, artist, sheet or lyric
    #[arg(long = "type", default_value = "music", value_parser = parse_kind)]
    kind: SearchKind,
    query: String,
}

#[derive(Debug, Parser, Clone)]
struct TrackCommand {
    #[command(flatten)]
    server: ServerArg,
    /// Provider id the track came from
    #[arg(long)]
    source: String,
    /// Track object as JSON, exactly as returned by search
    track: String,
}

#[derive(Debug, Parser, Clone)]
struct ImportCommand {
    #[command(flatten)]
    server: ServerArg,
    /// Only ask this provider
    #[arg(long)]
    source: Option<String>,
    url: String,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid search type {0:?}")]
    InvalidKind(String),
    #[error("no track title or artist supplied")]
    EmptyTrack,
}

fn parse_kind(raw: &str) -> Result<SearchKind, CliError> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| CliError::InvalidKind(raw.to_string()))
}

fn load_config(explicit: Option<&Path>, dirs: &AppDirs) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(dirs)?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

impl ServeCommand {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            config.server.static_dir = Some(dir.clone());
        }
    }
}

impl ServerArg {
    fn base_url(&self, config: &Config) -> String {
        self.server
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", config.server.port))
    }
}

impl TrackCommand {
    fn track(&self) -> Result<chorus_core::Track> {
        let track = parse_track(&self.track).context("track must be a JSON object")?;
        if track.title.is_empty() && track.artist.is_empty() && track.id.is_none() {
            return Err(CliError::EmptyTrack.into());
        }
        Ok(track)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let mut config = load_config(cli.config.as_deref(), &dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    match cli.command {
        Command::Serve(serve) => {
            serve.apply(&mut config);
            tracing::info!(
                "Starting Chorus on {}:{} (config dir: {})",
                config.server.host,
                config.server.port,
                dirs.config_dir().display()
            );
            let registry = load_providers(&config, &dirs).await?;
            let host = config.server.host.clone();
            let port = config.server.port;
            let ctx = AppContext::new(config, registry)?;
            start_server(ctx, &host, port).await?;
        }
        Command::Providers(ProvidersCommand::List) => print_providers(&config, &dirs),
        Command::Search(search) => {
            let client = ChorusClient::new(search.server.base_url(&config))?;
            let tracks = client
                .search(&search.source, &search.query, search.page, search.kind)
                .await?;
            println!("{}", serde_json::to_string_pretty(&tracks)?);
        }
        Command::Play(play) => {
            let client = ChorusClient::new(play.server.base_url(&config))?;
            if let Some(url) = client.play(&play.source, &play.track()?).await? {
                println!("{url}");
            }
        }
        Command::Lyric(lyric) => {
            let client = ChorusClient::new(lyric.server.base_url(&config))?;
            match client.lyric(&lyric.source, &lyric.track()?).await? {
                Some(text) => println!("{text}"),
                None => println!("No lyric found."),
            }
        }
        Command::Import(import) => {
            let client = ChorusClient::new(import.server.base_url(&config))?;
            let result = client.import(&import.url, import.source.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn print_providers(config: &Config, dirs: &AppDirs) {
    if config.plugins.providers.is_empty() {
        println!("No plugins configured. Add [[plugins.providers]] entries to config.toml.");
        return;
    }

    let sources = plugin_source_dir(&config.plugins.resolve_cache_dir(dirs));
    for entry in &config.plugins.providers {
        let cached = if sources.join(&entry.id).exists() {
            " (cached)"
        } else {
            ""
        };
        println!("Plugin: {}{}", entry.id, cached);
        if let Some(url) = &entry.url {
            println!("  url: {url}");
        }
        if let Some(interpreter) = &entry.interpreter {
            println!("  interpreter: {interpreter}");
        }
    }
}
