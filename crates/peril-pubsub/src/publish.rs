//! Typed publishing.

use std::sync::Arc;

use peril_broker::{Channel, Connection};
use peril_protocol::Message;

use crate::PubSubError;

/// Encodes `value` with its type's encoding and publishes it once.
///
/// Fire-and-forget: there is no retry and no publisher confirm. Broker
/// errors are returned to the caller.
pub async fn publish<Ch: Channel, T: Message>(
    channel: &Ch,
    exchange: &str,
    key: &str,
    value: &T,
) -> Result<(), PubSubError> {
    let payload = value.encode()?;
    channel
        .basic_publish(exchange, key, T::ENCODING.content_type(), &payload)
        .await?;
    tracing::debug!(exchange, key, bytes = payload.len(), "published");
    Ok(())
}

/// A cloneable handle for publishing on one dedicated channel.
pub struct Publisher<Ch> {
    channel: Arc<Ch>,
}

impl<Ch> Clone for Publisher<Ch> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<Ch: Channel> Publisher<Ch> {
    /// Wraps an already open channel.
    pub fn new(channel: Ch) -> Self {
        Self {
            channel: Arc::new(channel),
        }
    }

    /// Opens a new channel on `conn` for publishing.
    pub async fn open<C>(conn: &C) -> Result<Self, PubSubError>
    where
        C: Connection<Channel = Ch>,
    {
        Ok(Self::new(conn.create_channel().await?))
    }

    pub async fn publish<T: Message>(
        &self,
        exchange: &str,
        key: &str,
        value: &T,
    ) -> Result<(), PubSubError> {
        publish(self.channel.as_ref(), exchange, key, value).await
    }

    pub fn channel(&self) -> &Ch {
        &self.channel
    }
}
