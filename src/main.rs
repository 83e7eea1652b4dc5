mod cache;
mod commands;
mod config;
mod event;
mod host;
mod logging;
mod network;
mod runtime;
mod session;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cache::{CacheStorage, FetchRequest, SqliteStorage};
use event::EventHandler;
use host::LocalHost;
use network::HttpNetwork;
use runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "luccabot-sw")]
#[command(about = "Offline cache controller for the Luccabot landing page")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/luccabot-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin of the landing page, e.g. https://luccabot.com
  #[arg(short, long)]
  origin: Option<String>,

  /// Cache database file (default: $XDG_DATA_HOME/luccabot-sw/cache.db)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Debug logging
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<CommandKind>,
}

#[derive(Subcommand, Debug)]
enum CommandKind {
  /// Interactive session reading commands from stdin (default)
  Run {
    /// Keep new versions waiting even when they ask to skip waiting
    #[arg(long)]
    hold: bool,
  },
  /// Install the configured version
  Install {
    /// Install this release instead of the configured one
    #[arg(long)]
    version: Option<semver::Version>,
    /// Leave the installed version waiting
    #[arg(long)]
    hold: bool,
  },
  /// Install and activate, purging stale buckets
  Activate,
  /// Fetch a path through the active worker
  Fetch {
    path: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// List cache buckets
  Buckets,
  /// Delete every cache bucket
  Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.verbose)?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(origin) = args.origin {
    config.origin = origin;
  }
  if let Some(db) = args.db {
    config.storage.path = Some(db);
  }

  let worker_config = config.worker_config()?;
  let storage = Arc::new(SqliteStorage::open(config.storage.path.as_deref())?);
  let network = Arc::new(HttpNetwork::new(&worker_config.origin)?);
  let host = Arc::new(LocalHost::new());

  info!(
    bucket = %worker_config.cache_name,
    origin = %worker_config.origin,
    "Starting"
  );

  let command = args.command.unwrap_or(CommandKind::Run { hold: false });
  let runtime = Runtime::new(worker_config, Arc::clone(&storage), network, host);

  match command {
    CommandKind::Run { hold } => {
      let mut runtime = runtime.hold_waiting(hold);
      runtime.resume().await?;
      session::run(runtime, EventHandler::stdin()).await?;
    }
    CommandKind::Install { version, hold } => {
      let mut runtime = runtime.hold_waiting(hold);
      runtime.install(version).await?;
      report(&runtime);
    }
    CommandKind::Activate => {
      let mut runtime = runtime;
      runtime.install(None).await?;
      if runtime.waiting().is_some() {
        runtime.activate().await?;
      }
      report(&runtime);
    }
    CommandKind::Fetch { path, navigate } => {
      let mut runtime = runtime;
      if !runtime.resume().await? {
        runtime.install(None).await?;
        if runtime.waiting().is_some() {
          runtime.activate().await?;
        }
      }

      let url = runtime.config().resolve(&path)?;
      let request = if navigate {
        FetchRequest::navigate(url)
      } else {
        FetchRequest::get(url)
      };
      let outcome = runtime.fetch_now(request.clone()).await;
      println!("{}", session::format_outcome(&request, &outcome));
      outcome?;
    }
    CommandKind::Buckets => {
      let buckets = session::describe_buckets(storage.as_ref(), &runtime.config().cache_name)?;
      println!("{}", session::format_buckets(&buckets));
    }
    CommandKind::Purge => {
      let mut removed = 0;
      for name in storage.bucket_names()? {
        if storage.delete_bucket(&name)? {
          removed += 1;
        }
      }
      println!("removed {} bucket(s)", removed);
    }
  }

  Ok(())
}

fn report<S, N>(runtime: &Runtime<S, N>)
where
  S: CacheStorage + 'static,
  N: network::Network + 'static,
{
  for event in runtime.host().drain_events() {
    println!("{}", session::format_host_event(&event));
  }
  match (runtime.active(), runtime.waiting()) {
    (_, Some(waiting)) => println!("{} is waiting", waiting.bucket()),
    (Some(active), None) => println!("{} is active", active.bucket()),
    (None, None) => println!("no version installed"),
  }
}
