//! Console WebSocket channel (§4.H): one connection per operator, fanning
//! in client verbs (`JoinServer`/`LeaveServer`/`SendCommand`/`Ping`) and
//! fanning out server events (`ConsoleOutput`/`ConsoleHistory`/
//! `CommandResult`/`Error`/`Pong`) from every joined server's hub channel.
//!
//! Authentication is a bearer JWT carried in the `?token=` query parameter,
//! the same identity-assertion shape `routes::common::authenticate_operator`
//! uses for plain HTTP routes — a WebSocket upgrade has no body to carry a
//! header-equivalent credential before the handshake completes.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::OperatorClaims;
use crate::console::HubEvent;
use crate::context::Cancellation;
use crate::server::http::AppState;
use crate::types::{ErrorCode, GridkeepError};

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

#[derive(Deserialize)]
#[serde(tag = "verb", rename_all = "PascalCase")]
enum ClientMessage {
    JoinServer { server_id: Uuid },
    LeaveServer { server_id: Uuid },
    SendCommand { server_id: Uuid, node_id: Uuid, raw_command: String },
    Ping,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
enum ServerMessage<'a> {
    ConsoleOutput { server_id: Uuid, sequence_number: i64, output_type: &'a str, content: &'a str, lossy: bool },
    ConsoleHistory { server_id: Uuid, lines: Vec<crate::cache::console_history::ConsoleLine> },
    CommandResult { server_id: Uuid, accepted: bool },
    Error { error_code: &'a str, detail: &'a str },
    Pong,
}

fn token_from_query(req: &Request<Incoming>) -> Option<String> {
    extract_token(req.uri().query()?)
}

fn extract_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == "token").then(|| v.to_string())
    })
}

fn bad_request(detail: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .body(Full::new(Bytes::from(detail.to_string())))
        .unwrap()
}

fn unauthorized(detail: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(format!(r#"{{"error":"{detail}"}}"#))))
        .unwrap()
}

pub async fn handle_console_upgrade(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let Some(token) = token_from_query(&req) else {
        return unauthorized("missing ?token= bearer credential");
    };
    let claims = match state.operator_jwt.verify(&token) {
        Ok(c) => c,
        Err(e) => return unauthorized(&e.to_string()),
    };

    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            let connection_id = Uuid::new_v4();
            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => run_connection(state, connection_id, claims, ws).await,
                    Err(e) => warn!("console websocket upgrade failed: {e:?}"),
                }
            });
            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => bad_request(&format!("websocket upgrade failed: {e}")),
    }
}

async fn run_connection(
    state: Arc<AppState>,
    connection_id: Uuid,
    claims: OperatorClaims,
    ws: tokio_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>,
) {
    info!("console connection {connection_id} opened for operator {}", claims.sub);
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);
    let mut forwarders: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                warn!("console connection {connection_id} read error: {e}");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                handle_client_message(&state, connection_id, &claims, &text, &out_tx, &mut forwarders).await;
            }
            Message::Close(_) => break,
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }

    for (_, handle) in forwarders.drain() {
        handle.abort();
    }
    if let Err(e) = state.console_hub.disconnect(connection_id).await {
        warn!("console connection {connection_id} cleanup failed: {e}");
    }
    drop(out_tx);
    let _ = writer.await;
    info!("console connection {connection_id} closed");
}

async fn handle_client_message(
    state: &Arc<AppState>,
    connection_id: Uuid,
    claims: &OperatorClaims,
    text: &str,
    out_tx: &mpsc::Sender<Message>,
    forwarders: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    let message = match parsed {
        Ok(m) => m,
        Err(e) => {
            send(out_tx, &ServerMessage::Error { error_code: ErrorCode::InvalidPayload.as_str(), detail: &e.to_string() }).await;
            return;
        }
    };

    match message {
        ClientMessage::JoinServer { server_id } => {
            match state.console_hub.join_server(connection_id, server_id, claims.sub, claims.tenant).await {
                Ok((mut receiver, recent)) => {
                    send(out_tx, &ServerMessage::ConsoleHistory { server_id, lines: recent }).await;
                    let forward_tx = out_tx.clone();
                    let handle = tokio::spawn(async move {
                        loop {
                            match receiver.recv().await {
                                Ok(HubEvent::ConsoleOutput(line)) => {
                                    let msg = ServerMessage::ConsoleOutput {
                                        server_id,
                                        sequence_number: line.sequence_number,
                                        output_type: &line.output_type,
                                        content: &line.content,
                                        lossy: false,
                                    };
                                    if send(&forward_tx, &msg).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(HubEvent::Lossy) => {
                                    let msg = ServerMessage::ConsoleOutput {
                                        server_id,
                                        sequence_number: -1,
                                        output_type: "lossy",
                                        content: "",
                                        lossy: true,
                                    };
                                    if send(&forward_tx, &msg).await.is_err() {
                                        break;
                                    }
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    });
                    forwarders.insert(server_id, handle);
                }
                Err(e) => send_error(out_tx, &e).await,
            }
        }
        ClientMessage::LeaveServer { server_id } => {
            if let Some(handle) = forwarders.remove(&server_id) {
                handle.abort();
            }
            if let Err(e) = state.console_hub.leave_server(connection_id, server_id).await {
                send_error(out_tx, &e).await;
            }
        }
        ClientMessage::SendCommand { server_id, node_id, raw_command } => {
            let correlation_id = Uuid::new_v4();
            let result = state
                .console_hub
                .send_command(server_id, claims.sub, claims.tenant, correlation_id, node_id, &raw_command, Cancellation::new())
                .await;
            match result {
                Ok(()) => send(out_tx, &ServerMessage::CommandResult { server_id, accepted: true }).await,
                Err(e) => send_error(out_tx, &e).await,
            };
        }
        ClientMessage::Ping => {
            send(out_tx, &ServerMessage::Pong).await;
        }
    }
}

async fn send(out_tx: &mpsc::Sender<Message>, msg: &ServerMessage<'_>) -> Result<(), ()> {
    let text = serde_json::to_string(msg).unwrap_or_else(|_| r#"{"event":"Error"}"#.to_string());
    out_tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn send_error(out_tx: &mpsc::Sender<Message>, err: &GridkeepError) {
    let _ = send(out_tx, &ServerMessage::Error { error_code: err.code().as_str(), detail: &err.public_detail() }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_finds_token_param() {
        assert_eq!(extract_token("token=abc123"), Some("abc123".to_string()));
        assert_eq!(extract_token("foo=bar&token=abc123"), Some("abc123".to_string()));
    }

    #[test]
    fn extract_token_returns_none_when_absent() {
        assert_eq!(extract_token("foo=bar"), None);
        assert_eq!(extract_token(""), None);
    }
}
