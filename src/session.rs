//! Interactive session: feeds input events to the runtime and prints results.

use color_eyre::Result;
use tokio::task::JoinSet;
use tracing::warn;

use crate::cache::{CacheName, CacheSource, CacheStorage, FetchRequest};
use crate::commands::{self, SessionCommand};
use crate::event::{Event, EventHandler};
use crate::host::HostEvent;
use crate::network::Network;
use crate::runtime::{FetchOutcome, Runtime};

/// How a bucket relates to the configured version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
  Current,
  /// Same app and purpose, other version
  Stale,
  /// Not one of ours
  Foreign,
}

#[derive(Debug, Clone)]
pub struct BucketInfo {
  pub name: String,
  pub entries: usize,
  pub status: BucketStatus,
}

/// Every bucket in storage with its entry count and status.
pub fn describe_buckets<S: CacheStorage>(storage: &S, current: &CacheName) -> Result<Vec<BucketInfo>> {
  let current_name = current.to_string();

  storage
    .bucket_names()?
    .into_iter()
    .map(|name| {
      let status = if name == current_name {
        BucketStatus::Current
      } else {
        match name.parse::<CacheName>() {
          Ok(parsed) if parsed.same_family(current) => BucketStatus::Stale,
          _ => BucketStatus::Foreign,
        }
      };
      let entries = storage.entry_count(&name)?;
      Ok(BucketInfo {
        name,
        entries,
        status,
      })
    })
    .collect()
}

pub fn format_buckets(buckets: &[BucketInfo]) -> String {
  if buckets.is_empty() {
    return "no buckets".to_string();
  }

  buckets
    .iter()
    .map(|b| {
      let marker = match b.status {
        BucketStatus::Current => "*",
        BucketStatus::Stale => "-",
        BucketStatus::Foreign => "?",
      };
      format!("{} {} ({} entries)", marker, b.name, b.entries)
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// One-line summary of a fetch outcome.
pub fn format_outcome(request: &FetchRequest, outcome: &Result<FetchOutcome>) -> String {
  match outcome {
    Ok(FetchOutcome::Intercepted(result)) => {
      let source = match result.source {
        CacheSource::Cache => "cache",
        CacheSource::Network => "network",
        CacheSource::OfflineFallback => "offline page",
      };
      format!(
        "{} {} -> {} ({}, {} bytes)",
        request.method,
        request.url,
        result.response.status,
        source,
        result.response.body.len()
      )
    }
    Ok(FetchOutcome::PassedThrough(response)) => format!(
      "{} {} -> {} (not intercepted, {} bytes)",
      request.method,
      request.url,
      response.status,
      response.body.len()
    ),
    Err(e) => format!("{} {} -> failed: {:#}", request.method, request.url, e),
  }
}

pub fn format_host_event(event: &HostEvent) -> String {
  match event {
    HostEvent::SkipWaiting => "host: skip-waiting signaled".to_string(),
    HostEvent::ClientsClaimed => "host: clients claimed".to_string(),
    HostEvent::NotificationShown(n) => format!(
      "host: notification {}",
      serde_json::to_string(n).unwrap_or_else(|_| n.title.clone())
    ),
    HostEvent::NotificationClosed => "host: notification closed".to_string(),
    HostEvent::WindowOpened(url) => format!("host: window opened at {}", url),
  }
}

fn print_state<S, N>(runtime: &Runtime<S, N>)
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  match runtime.active() {
    Some(w) => println!("active:  {} ({})", w.bucket(), w.state()),
    None => println!("active:  none"),
  }
  match runtime.waiting() {
    Some(w) => println!("waiting: {} ({})", w.bucket(), w.state()),
    None => println!("waiting: none"),
  }
}

/// Run until input closes or `quit`, then wait for in-flight fetches.
pub async fn run<S, N>(mut runtime: Runtime<S, N>, mut events: EventHandler) -> Result<()>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  let mut in_flight: JoinSet<(FetchRequest, Result<FetchOutcome>)> = JoinSet::new();

  loop {
    tokio::select! {
      Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
        match done {
          Ok((request, outcome)) => println!("{}", format_outcome(&request, &outcome)),
          Err(e) => warn!("Fetch task failed: {}", e),
        }
        continue;
      }
      event = events.next() => {
        let command = match event {
          Some(Event::Command(command)) => command,
          Some(Event::Invalid(reason)) => {
            println!("error: {}", reason);
            continue;
          }
          Some(Event::Closed) | None => break,
        };

        let result = match command {
          SessionCommand::Quit => break,
          SessionCommand::Help => {
            println!("{}", commands::help());
            Ok(())
          }
          SessionCommand::State => {
            print_state(&runtime);
            Ok(())
          }
          SessionCommand::Buckets => describe_buckets(runtime.storage(), &runtime.config().cache_name)
            .map(|b| println!("{}", format_buckets(&b))),
          SessionCommand::Install(version) => runtime.install(version).await,
          SessionCommand::Activate => runtime.activate().await,
          SessionCommand::Message(kind) => runtime.post_message(kind).await,
          SessionCommand::Sync(tag) => runtime.sync(&tag).await,
          SessionCommand::Push(text) => runtime.push(text.as_deref()).await,
          SessionCommand::Click(action) => runtime.notification_click(action).await,
          SessionCommand::Fetch { method, target, mode } => {
            runtime.config().resolve(&target).map(|url| {
              let request = FetchRequest::new(method, url, mode);
              let handle = runtime.fetch(request.clone());
              in_flight.spawn(async move {
                let outcome = match handle.await {
                  Ok(outcome) => outcome,
                  Err(e) => Err(color_eyre::eyre::eyre!("Fetch task failed: {}", e)),
                };
                (request, outcome)
              });
            })
          }
        };

        if let Err(e) = result {
          println!("error: {:#}", e);
        }
        for event in runtime.host().drain_events() {
          println!("{}", format_host_event(&event));
        }
      }
    }
  }

  // Every fetch must settle before the runtime goes away
  while let Some(done) = in_flight.join_next().await {
    if let Ok((request, outcome)) = done {
      println!("{}", format_outcome(&request, &outcome));
    }
  }

  Ok(())
}
