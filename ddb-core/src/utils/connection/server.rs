//! Command Server Module
//!
//! HTTP and WebSocket front end built on `picoserve`. Its only job is to get a
//! new gain value from the network into the shared `GainParameter`; it never
//! touches the control loop directly and never waits on it.
//!
//! - `POST /command` scans the body for `"kp":` followed by a number and
//!   answers with a redirect to `/index.shtml`.
//! - `/ws` accepts JSON `{"kp": <f32>}` frames (text or binary) and replies
//!   with the gain that was applied.
//! - `/` and `/index.shtml` serve the control page.

extern crate alloc;

use embassy_net::Stack;
use embassy_time::Duration;
use embedded_io_async::Read;
use picoserve::{
    extract::FromRequest,
    io::embedded_io_async as embedded_aio,
    request::{RequestBody, RequestParts},
    response::{
        ws::{Message, ReadMessageError, SocketRx, SocketTx, WebSocketCallback, WebSocketUpgrade},
        Redirect, StatusCode,
    },
    Router,
};
use serde::Deserialize;

use crate::utils::{
    connection::gain::{extract_gain, GainParameter},
    frontend::INDEX_HTML,
};

/// Where `POST /command` redirects after handling the payload.
pub const REDIRECT_TARGET: &str = "/index.shtml";

/// JSON frame accepted on the WebSocket.
#[derive(Debug, Deserialize)]
pub struct GainUpdate {
    pub kp: f32,
}

/// Parse a WebSocket frame: strict JSON first, then the same marker scan
/// used for `POST /command`.
pub fn parse_frame(data: &[u8]) -> Option<f32> {
    if let Ok(update) = serde_json::from_slice::<GainUpdate>(data) {
        return Some(update.kp);
    }
    core::str::from_utf8(data).ok().and_then(extract_gain)
}

/// Apply a `POST /command` body to the gain cell.
///
/// Returns the stored value, or `None` if the body carried no usable gain (the
/// cell is left unchanged).
pub fn apply_command(
    gain: &GainParameter,
    body: &str,
) -> Option<f32> {
    match extract_gain(body) {
        Some(kp) => {
            gain.set_gain(kp);
            tracing::info!(kp, "gain updated");
            Some(kp)
        }
        None => {
            tracing::warn!(body, "command payload without a usable kp");
            None
        }
    }
}

/// `POST /command`: apply the body, then send the browser back to the page.
pub fn handle_command(
    gain: &GainParameter,
    body: &str,
) -> Redirect {
    apply_command(gain, body);
    Redirect::to(REDIRECT_TARGET)
}

/// WebSocket session that writes received gains into the shared cell.
pub struct CommandSocket {
    pub gain: &'static GainParameter,
}

impl CommandSocket {
    fn handle(
        &self,
        data: &[u8],
    ) -> Option<f32> {
        let kp = parse_frame(data)?;
        self.gain.set_gain(kp);
        tracing::info!(kp, "gain updated over websocket");
        Some(kp)
    }
}

impl WebSocketCallback for CommandSocket {
    async fn run<Reader, Writer>(
        self,
        mut rx: SocketRx<Reader>,
        mut tx: SocketTx<Writer>,
    ) -> Result<(), Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let mut buffer = [0; 512];

        tx.send_text("Connected").await?;

        let close_reason = loop {
            match rx.next_message(&mut buffer).await {
                Ok(Message::Pong(_)) => continue,
                Ok(Message::Ping(data)) => tx.send_pong(data).await?,
                Ok(Message::Close(reason)) => {
                    tracing::info!(?reason, "websocket closed");
                    break None;
                }
                Ok(Message::Text(data)) => match self.handle(data.as_bytes()) {
                    Some(kp) => tx.send_text(&alloc::format!("kp={kp}")).await?,
                    None => {
                        tracing::error!(data, "error parsing gain update");
                        tx.send_text("Invalid command format").await?
                    }
                },
                Ok(Message::Binary(data)) => match self.handle(data) {
                    Some(kp) => tx.send_binary(&kp.to_le_bytes()).await?,
                    None => {
                        tracing::error!("error parsing binary gain update");
                        tx.send_binary(b"Invalid command format").await?
                    }
                },
                Err(error) => {
                    tracing::error!(?error, "websocket error");
                    let code = match error {
                        ReadMessageError::TextIsNotUtf8 => 1007,
                        ReadMessageError::ReservedOpcode(_) => 1003,
                        ReadMessageError::ReadFrameError(_)
                        | ReadMessageError::UnexpectedMessageStart
                        | ReadMessageError::MessageStartsWithContinuation => 1002,
                        ReadMessageError::Io(err) => return Err(err),
                    };
                    break Some((code, "Websocket Error"));
                }
            };
        };

        tx.close(close_reason).await
    }
}

/// Raw `POST /command` body, validated as UTF-8.
pub struct CommandBody {
    pub text: alloc::string::String,
}

impl<'r, S> FromRequest<'r, S> for CommandBody {
    type Rejection = &'static str;

    async fn from_request<R: Read>(
        _state: &'r S,
        _parts: RequestParts<'r>,
        body: RequestBody<'r, R>,
    ) -> Result<Self, Self::Rejection> {
        let bytes = body
            .read_all()
            .await
            .map_err(|_| "Failed to read request body")?;
        let text = core::str::from_utf8(bytes).map_err(|_| "Body is not UTF-8")?;
        Ok(CommandBody {
            text: alloc::string::String::from(text),
        })
    }
}

/// Serve the command endpoints forever.
pub async fn run(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    gain: &'static GainParameter,
    config: Option<&'static picoserve::Config<Duration>>,
) -> ! {
    let default_config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    });

    let config = config.unwrap_or(&default_config);

    let index = || async {
        picoserve::response::Response::new(StatusCode::OK, INDEX_HTML)
            .with_headers([("Content-Type", "text/html; charset=utf-8")])
    };

    let router = Router::new()
        .route("/", picoserve::routing::get(index))
        .route(REDIRECT_TARGET, picoserve::routing::get(index))
        .route(
            "/command",
            picoserve::routing::post(move |body: CommandBody| async move {
                handle_command(gain, &body.text)
            }),
        )
        .route(
            "/ws",
            picoserve::routing::get(move |upgrade: WebSocketUpgrade| async move {
                tracing::info!("new websocket connection");
                upgrade
                    .on_upgrade(CommandSocket { gain })
                    .with_protocol("messages")
            }),
        );

    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("Send POST requests to http://{}:{}/command", ip_cfg.address, port);
    } else {
        tracing::warn!("Starting command server on port {port}, but no IPv4 address is assigned yet!");
    }

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 1024], [0; 2048]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_body_updates_gain() {
        let gain = GainParameter::new(0.0);
        assert_eq!(apply_command(&gain, r#"{"kp":3.5}"#), Some(3.5));
        assert_eq!(gain.get_gain(), 3.5);
    }

    #[test]
    fn unusable_post_body_leaves_gain() {
        let gain = GainParameter::new(1.25);
        assert_eq!(apply_command(&gain, r#"{"kp":"x"}"#), None);
        assert_eq!(apply_command(&gain, "kp=2"), None);
        assert_eq!(gain.get_gain(), 1.25);
    }

    #[test]
    fn command_handler_updates_then_redirects() {
        let gain = GainParameter::new(0.0);
        let _redirect: Redirect = handle_command(&gain, "{\"kp\": 3.5}");
        assert_eq!(gain.get_gain(), 3.5);
        let _redirect: Redirect = handle_command(&gain, "garbage");
        assert_eq!(gain.get_gain(), 3.5);
    }

    #[test]
    fn websocket_frames() {
        assert_eq!(parse_frame(br#"{"kp": 0.75}"#), Some(0.75));
        assert_eq!(parse_frame(br#"{"cmd":"set","kp":-2}"#), Some(-2.0));
        assert_eq!(parse_frame(b"hello"), None);
        assert_eq!(parse_frame(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn websocket_session_writes_cell() {
        static GAIN: GainParameter = GainParameter::new(0.0);
        let socket = CommandSocket { gain: &GAIN };
        assert_eq!(socket.handle(br#"{"kp":4.0}"#), Some(4.0));
        assert_eq!(GAIN.get_gain(), 4.0);
        assert_eq!(socket.handle(b"{}"), None);
        assert_eq!(GAIN.get_gain(), 4.0);
    }
}
