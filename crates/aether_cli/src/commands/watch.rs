//! Watch command implementation.

use crate::json::value_to_json;
use aether_client::{Change, ChangeKind, ChannelHandler, Client, ClientConfig};
use aether_protocol::{AetherUrl, Capabilities};
use serde::Serialize;
use std::sync::{mpsc, Arc};

/// One printed change.
#[derive(Debug, Serialize)]
pub struct ChangeLine {
    /// Global sequence of the operation.
    pub global_sequence: u64,
    /// assign, apply, clear or kick.
    pub kind: &'static str,
    /// Participant the change was delivered to.
    pub participant: i64,
    /// Relative position of the change, if below the participant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    /// New contents for assigns and applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl From<&Change> for ChangeLine {
    fn from(change: &Change) -> Self {
        Self {
            global_sequence: change.global_sequence,
            kind: match change.kind {
                ChangeKind::Assign => "assign",
                ChangeKind::Apply => "apply",
                ChangeKind::Clear => "clear",
                ChangeKind::Kick => "kick",
            },
            participant: change.participant,
            dimension: change.dimension.as_ref().map(ToString::to_string),
            value: change.value.as_ref().map(value_to_json),
        }
    }
}

impl ChangeLine {
    fn render(&self, format: &str) -> Result<String, serde_json::Error> {
        if format == "json" {
            return serde_json::to_string(self);
        }
        let mut line = format!("#{} {}", self.global_sequence, self.kind);
        if let Some(dimension) = &self.dimension {
            line.push(' ');
            line.push_str(dimension);
        }
        if let Some(value) = &self.value {
            line.push_str(" = ");
            line.push_str(&value.to_string());
        }
        Ok(line)
    }
}

/// Joins at the URL's dimension and prints changes until the server goes
/// away, the participant is kicked, or `count` changes were printed.
pub fn run(
    url: &str,
    count: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = AetherUrl::parse(url)?;
    let client = Client::connect_with(&url, ClientConfig::default())?;
    let (tx, rx) = mpsc::channel();
    let participant = client.join(
        &url.dimension,
        Capabilities::all(),
        Arc::new(ChannelHandler::new(tx)),
    )?;
    eprintln!("watching {} as participant {}", url.dimension, participant.id());

    let mut seen = 0;
    for change in rx {
        println!("{}", ChangeLine::from(&change).render(format)?);
        seen += 1;
        if change.kind == ChangeKind::Kick || count.is_some_and(|n| seen >= n) {
            break;
        }
    }

    if client.is_running() {
        client.disconnect()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_tree::{Dimension, Value};

    fn change() -> Change {
        Change {
            kind: ChangeKind::Assign,
            participant: 3,
            global_sequence: 12,
            dimension: Some(Dimension::parse("temp").unwrap()),
            value: Some(Value::leaf(21)),
        }
    }

    #[test]
    fn text_line() {
        let line = ChangeLine::from(&change()).render("text").unwrap();
        assert_eq!(line, "#12 assign temp = 21");
    }

    #[test]
    fn json_line() {
        let line = ChangeLine::from(&change()).render("json").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["kind"], "assign");
        assert_eq!(parsed["value"], 21);
        assert_eq!(parsed["dimension"], "temp");
    }
}
