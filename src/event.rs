use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::{self, SessionCommand};

/// Session input events
#[derive(Debug)]
pub enum Event {
  /// A parsed command line
  Command(SessionCommand),
  /// A line that failed to parse, with the reason
  Invalid(String),
  /// Input closed
  Closed,
}

/// Event handler that turns input lines into session events
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Read commands from stdin
  pub fn stdin() -> Self {
    Self::from_reader(BufReader::new(tokio::io::stdin()))
  }

  /// Read commands from any line-oriented source
  pub fn from_reader<R>(reader: R) -> Self
  where
    R: AsyncBufRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn line reader
    tokio::spawn(async move {
      let mut lines = reader.lines();
      loop {
        let event = match lines.next_line().await {
          Ok(Some(line)) => match commands::parse_line(&line) {
            Ok(Some(command)) => Event::Command(command),
            Ok(None) => continue,
            Err(e) => Event::Invalid(e.to_string()),
          },
          Ok(None) => Event::Closed,
          Err(e) => {
            tracing::warn!("Failed to read input: {}", e);
            Event::Closed
          }
        };

        let closed = matches!(event, Event::Closed);
        if tx.send(event).is_err() || closed {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
