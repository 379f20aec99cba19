//! WebSocket client for `com.atproto.sync.subscribeRepos`.

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use metrics::counter;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::subscription::{EventStream, StreamConnector, StreamError};
use crate::codec::{Frame, decode_frame};

const SUBSCRIBE_PATH: &str = "/xrpc/com.atproto.sync.subscribeRepos";
const METRIC_INVALID_MESSAGES: &str = "listfeed_firehose_invalid_messages_total";

/// Opens a new relay connection per subscription.
#[derive(Debug, Clone)]
pub struct FirehoseConnector {
    endpoint: Url,
}

impl FirehoseConnector {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn subscribe_url(&self, cursor: Option<i64>) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(SUBSCRIBE_PATH);
        url.set_query(None);
        if let Some(cursor) = cursor {
            url.query_pairs_mut()
                .append_pair("cursor", &cursor.to_string());
        }
        url
    }
}

#[async_trait]
impl StreamConnector for FirehoseConnector {
    async fn connect(&self, cursor: Option<i64>) -> Result<EventStream, StreamError> {
        let url = self.subscribe_url(cursor);
        let (socket, response) = connect_async(url.as_str())
            .await
            .map_err(|err| StreamError::Connect {
                endpoint: url.to_string(),
                message: err.to_string(),
            })?;

        info!(
            target = "infra::firehose",
            url = %url,
            status = response.status().as_u16(),
            "subscribed to repository stream"
        );
        Ok(event_stream(socket))
    }
}

/// Decode websocket messages into repository events.
///
/// Messages that fail validation are skipped. A transport error or a remote
/// error frame is yielded once and ends the stream; a close frame ends it quietly.
pub(crate) fn event_stream<S>(messages: S) -> EventStream
where
    S: Stream<Item = Result<Message, WsError>> + Send + 'static,
{
    let events = stream! {
        let mut messages = Box::pin(messages);
        while let Some(message) = messages.next().await {
            let payload = match message {
                Ok(Message::Binary(payload)) => payload,
                Ok(Message::Close(frame)) => {
                    debug!(target = "infra::firehose", ?frame, "remote closed the stream");
                    break;
                }
                Ok(Message::Text(_)) => {
                    counter!(METRIC_INVALID_MESSAGES).increment(1);
                    warn!(target = "infra::firehose", "skipping unexpected text message");
                    continue;
                }
                Ok(_) => continue,
                Err(err) => {
                    yield Err(StreamError::transport(err.to_string()));
                    break;
                }
            };

            match decode_frame(&payload) {
                Ok(Frame::Event(event)) => yield Ok(event),
                Ok(Frame::Error { error, message }) => {
                    yield Err(StreamError::Remote { error, message });
                    break;
                }
                Err(err) => {
                    counter!(METRIC_INVALID_MESSAGES).increment(1);
                    warn!(
                        target = "infra::firehose",
                        error = %err,
                        len = payload.len(),
                        "skipping invalid stream message"
                    );
                }
            }
        }
    };
    events.boxed()
}
