use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::cookie::{CookieStore, Jar};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::{Position, Url};

use crate::error::{Error, Result};
use crate::types::GroupId;

/// One live, receive-only connection to a group channel
#[async_trait]
pub trait Transport: Send {
    /// Next text frame, or `None` once the peer has closed the connection
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports to a group channel
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport + 'static;

    async fn connect(&self, group_id: &GroupId) -> Result<Self::Transport>;
}

/// Derive the channel URL for `group_id` from an http(s) page origin.
///
/// The socket scheme mirrors the page scheme: `https` becomes `wss`.
pub fn endpoint_url(origin: &Url, group_id: &GroupId) -> Result<Url> {
    let scheme = match origin.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(Error::InvalidParameter(format!(
                "origin scheme must be http or https, got {}",
                other
            )))
        }
    };
    if origin.host_str().is_none() {
        return Err(Error::InvalidParameter(format!(
            "origin {} has no host",
            origin
        )));
    }

    let authority = &origin[Position::BeforeHost..Position::AfterPort];
    let mut url = Url::parse(&format!("{}://{}", scheme, authority))?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidParameter(format!("cannot build a path on {}", origin)))?
        .pop_if_empty()
        .extend(["ws", "groups", group_id.as_str()]);
    Ok(url)
}

/// [`Connector`] backed by `tokio-tungstenite`.
///
/// Session cookies held in the shared jar for the page origin ride along on
/// the upgrade request, the way a browser attaches them.
#[derive(Clone)]
pub struct WsConnector {
    origin: Url,
    cookies: Option<Arc<Jar>>,
}

impl WsConnector {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            cookies: None,
        }
    }

    pub fn with_cookies(mut self, jar: Arc<Jar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, group_id: &GroupId) -> Result<WsTransport> {
        let url = endpoint_url(&self.origin, group_id)?;
        let mut request = url.as_str().into_client_request()?;

        if let Some(cookie) = self.cookies.as_ref().and_then(|jar| jar.cookies(&self.origin)) {
            if let Ok(value) = HeaderValue::from_bytes(cookie.as_bytes()) {
                request.headers_mut().insert(COOKIE, value);
            }
        }

        let (stream, _) = connect_async(request).await?;
        info!(url = %url, "websocket connected");
        Ok(WsTransport { stream })
    }
}

/// A group channel over a tungstenite WebSocket stream
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Notifications are text only
                Ok(Message::Binary(bytes)) => {
                    debug!(len = bytes.len(), "dropping binary frame");
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "server closed websocket");
                    return None;
                }
                // Ping/pong are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.map_err(Error::from)
    }
}
