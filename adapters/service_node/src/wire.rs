use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{NodeError, ServiceNode};

/// One request line: the target endpoint and its JSON request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Endpoint the request is addressed to.
    pub endpoint: String,
    /// Request payload handed to the service.
    #[serde(default)]
    pub request: Value,
}

/// One reply line: either the service response or a failure description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Response produced by the service.
    Ok(Value),
    /// Description of why the call failed.
    Error(String),
}

/// Reason a serve loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServeOutcome {
    /// The request stream ended while the node was still running.
    Drained,
    /// A fatal service failure shut the node down.
    ShutDown,
}

impl ServiceNode {
    /// Serves newline-delimited [`Envelope`]s, writing one [`Reply`] per line.
    ///
    /// Malformed lines are answered with an error reply and do not stop the
    /// loop. The loop returns once the input is exhausted or the node shuts
    /// down.
    pub fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<ServeOutcome, NodeError>
    where
        R: BufRead,
        W: Write,
    {
        if self.is_shut_down() {
            return Ok(ServeOutcome::ShutDown);
        }

        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let Some((endpoint, reply)) = self.answer_line(&line) else {
                continue;
            };

            let encoded = serde_json::to_string(&reply)
                .map_err(|source| NodeError::Encode { endpoint, source })?;
            writeln!(writer, "{encoded}")?;
            writer.flush()?;

            if self.is_shut_down() {
                return Ok(ServeOutcome::ShutDown);
            }
        }

        Ok(ServeOutcome::Drained)
    }

    /// Answers one raw request line; blank lines get no reply.
    fn answer_line(&mut self, raw: &[u8]) -> Option<(String, Reply)> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(error) => {
                warn!(%error, "discarding request line that is not utf-8");
                return Some((
                    String::new(),
                    Reply::Error(format!("malformed request line: {error}")),
                ));
            }
        };
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => {
                let reply = match self.call_value(&envelope.endpoint, envelope.request) {
                    Ok(response) => Reply::Ok(response),
                    Err(error) => Reply::Error(error.to_string()),
                };
                Some((envelope.endpoint, reply))
            }
            Err(error) => {
                warn!(%error, "discarding malformed request line");
                Some((String::new(), Reply::Error(format!("malformed envelope: {error}"))))
            }
        }
    }
}
