use eyre::Result as EyreResult;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{NotificationRecord, NOTIFICATIONS_PATH};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the push-notification channel with a bearer credential. Exposed
/// separately from [`NotificationListener::spawn`] so the authorization
/// probes can inspect the raw handshake failure.
pub async fn connect(host: &str, token: &str) -> Result<WsStream, WsError> {
    let mut request = format!("wss://{host}{NOTIFICATIONS_PATH}").into_client_request()?;

    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|err| WsError::HttpFormat(err.into()))?;
    drop(request.headers_mut().insert(AUTHORIZATION, bearer));

    let (stream, _response) = connect_async(request).await?;

    Ok(stream)
}

/// Background task accumulating change notifications for the duration of
/// the mutation phase. Cancellation is a controlled handoff: the task
/// returns every record appended before the cancellation point.
#[derive(Debug)]
pub struct NotificationListener {
    handle: JoinHandle<Vec<NotificationRecord>>,
    token: CancellationToken,
}

impl NotificationListener {
    /// Connect and start accumulating. The channel is fully established
    /// before this returns, so no notification for a later mutation can be
    /// missed.
    pub async fn spawn(host: &str, user_token: &str) -> EyreResult<Self> {
        let stream = connect(host, user_token).await?;
        let token = CancellationToken::new();

        let handle = tokio::spawn(watch(stream, token.clone()));

        Ok(Self { handle, token })
    }

    /// Cancel the listener and take ownership of everything it captured.
    pub async fn finish(self) -> EyreResult<Vec<NotificationRecord>> {
        self.token.cancel();

        self.handle.await.map_err(Into::into)
    }
}

async fn watch(stream: WsStream, token: CancellationToken) -> Vec<NotificationRecord> {
    let (_write, mut read) = stream.split();
    let mut records = Vec::new();

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => match NotificationRecord::from_frame(&text) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!(%err, "dropping undecodable notification frame"),
                },
                // Control frames carry no change records.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    // Partial results are still valid for reconciliation.
                    debug!(%err, "notification stream failed, stopping");
                    break;
                }
                None => {
                    debug!("notification stream closed by the service");
                    break;
                }
            },
        }
    }

    debug!(count = records.len(), "notification listener drained");

    records
}
