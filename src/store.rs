//! Store process - child side of the supervisor protocol.
//!
//! This module provides the serving loop that runs inside the store
//! subprocess. The parent side (spawning, request/response exchange) is in
//! supervisor.rs.
//!
//! The loop is strictly sequential: one request line in, one reply line out,
//! nothing in flight in between. Malformed lines are skipped rather than
//! answered, so a confused peer cannot take the store down. EOF on input ends
//! the loop - an orphaned store whose supervisor died loses its stdin pipe
//! and exits on its own.

use std::collections::HashMap;
use std::io;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{ReplyCodec, RequestCodec};
use crate::bridge::protocol::{Incoming, Reply, Request};

/// Run the serving loop over the process's own stdin/stdout.
pub async fn run_store(seed: HashMap<String, String>) -> io::Result<()> {
    serve(seed, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve requests from `input`, writing one reply line per request to
/// `output`, until a STOP request or end of input.
pub async fn serve<R, W>(seed: HashMap<String, String>, input: R, output: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut variables = seed;
    let mut reader = FramedRead::new(input, RequestCodec::new());
    let mut writer = FramedWrite::new(output, ReplyCodec::new());

    tracing::debug!(vars = variables.len(), "Store process serving");

    while let Some(incoming) = reader.next().await {
        match incoming? {
            Incoming::Malformed => {
                tracing::trace!("Skipping malformed request line");
            }
            Incoming::UnknownAction => {
                writer.send(Reply::UnknownAction).await?;
            }
            Incoming::Request(Request::Set { key, value }) => {
                variables.insert(key, value.clone());
                writer.send(Reply::Value(value)).await?;
            }
            Incoming::Request(Request::Get { key }) => {
                let reply = match variables.get(&key) {
                    Some(value) => Reply::Value(value.clone()),
                    None => Reply::NotSet,
                };
                writer.send(reply).await?;
            }
            Incoming::Request(Request::Exists { key }) => {
                let reply = if variables.contains_key(&key) {
                    Reply::Yes
                } else {
                    Reply::No
                };
                writer.send(reply).await?;
            }
            Incoming::Request(Request::Stop {}) => {
                writer.send(Reply::Ok).await?;
                tracing::debug!("Stop acknowledged, terminating");
                return Ok(());
            }
        }
    }

    tracing::debug!("Input stream closed, terminating");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use crate::bridge::protocol::Request;

    fn seeded(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn request_line(request: &Request) -> String {
        serde_json::to_string(request).unwrap()
    }

    /// Feed the given lines to a store over an in-memory pipe and collect
    /// every reply line it writes before terminating.
    async fn run_session(seed: HashMap<String, String>, input_lines: &[String]) -> Vec<String> {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let store = tokio::spawn(serve(seed, server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        for line in input_lines {
            // A write can fail if the store already stopped (e.g. lines after
            // STOP); that is part of what these sessions exercise.
            if client_write.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = client_write.write_all(b"\n").await;
        }
        let _ = client_write.shutdown().await;

        let mut replies = Vec::new();
        let mut lines = BufReader::new(client_read).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            replies.push(line);
        }

        store.await.unwrap().unwrap();
        replies
    }

    #[tokio::test]
    async fn seeded_values_are_readable() {
        let replies = run_session(
            seeded(&[("color", "blue")]),
            &[request_line(&Request::Get {
                key: "color".to_string(),
            })],
        )
        .await;
        assert_eq!(replies, vec!["blue"]);
    }

    #[tokio::test]
    async fn set_echoes_and_overwrites() {
        let replies = run_session(
            HashMap::new(),
            &[
                request_line(&Request::Set {
                    key: "color".to_string(),
                    value: "blue".to_string(),
                }),
                request_line(&Request::Set {
                    key: "color".to_string(),
                    value: "red".to_string(),
                }),
                request_line(&Request::Get {
                    key: "color".to_string(),
                }),
            ],
        )
        .await;
        assert_eq!(replies, vec!["blue", "red", "red"]);
    }

    #[tokio::test]
    async fn get_of_missing_key_replies_not_set() {
        let replies = run_session(
            HashMap::new(),
            &[request_line(&Request::Get {
                key: "size".to_string(),
            })],
        )
        .await;
        assert_eq!(replies, vec!["_NOT_SET"]);
    }

    #[tokio::test]
    async fn exists_replies_yes_or_no() {
        let replies = run_session(
            seeded(&[("color", "blue")]),
            &[
                request_line(&Request::Exists {
                    key: "color".to_string(),
                }),
                request_line(&Request::Exists {
                    key: "size".to_string(),
                }),
            ],
        )
        .await;
        assert_eq!(replies, vec!["YES", "NO"]);
    }

    #[tokio::test]
    async fn unknown_action_does_not_end_the_session() {
        let replies = run_session(
            seeded(&[("color", "blue")]),
            &[
                r#"{"action": "FROB", "data": {}}"#.to_string(),
                request_line(&Request::Get {
                    key: "color".to_string(),
                }),
            ],
        )
        .await;
        assert_eq!(replies, vec!["_UNKNOWN_ACTION", "blue"]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_without_a_reply() {
        let replies = run_session(
            seeded(&[("color", "blue")]),
            &[
                "not json".to_string(),
                String::new(),
                r#"{"action": "SET", "data": {"key": "k"}}"#.to_string(),
                request_line(&Request::Get {
                    key: "color".to_string(),
                }),
            ],
        )
        .await;
        assert_eq!(replies, vec!["blue"]);
    }

    #[tokio::test]
    async fn stop_acknowledges_then_terminates() {
        let replies = run_session(
            HashMap::new(),
            &[
                request_line(&Request::Stop {}),
                // Anything after STOP is never read.
                request_line(&Request::Get {
                    key: "color".to_string(),
                }),
            ],
        )
        .await;
        assert_eq!(replies, vec!["OK"]);
    }
}
