use async_trait::async_trait;

use super::{Channel, ChannelId, SendError};

/// Channel used when nothing else is configured. Logs the message and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChannel;

#[async_trait]
impl Channel for NullChannel {
	fn id(&self) -> ChannelId {
		ChannelId::Null
	}

	async fn send(&self, text: &str) -> Result<(), SendError> {
		tracing::debug!("null channel discarding message:\n{text}");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn always_delivers() {
		assert!(NullChannel.send("anything").await.is_ok());
		assert!(NullChannel.send("").await.is_ok());
	}
}
