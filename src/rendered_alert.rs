//! Rendered notification text. Channels with a hard message size limit get a
//! second, shorter template as a fallback if the regular one renders too long.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// which template produced a [RenderedMessage]
pub enum SizeClass {
	/// rendered with the channel's primary template
	Normal,
	/// the primary rendering exceeded the channel limit and the fallback template was used
	Oversized,
}

/// Error occuring when constructing a [RenderedMessage]
#[derive(Error, Debug, Clone)]
pub enum MessageContentError {
	/// the channel's size limit was exceeded
	#[error("message length {length} exceeds the limit of {limit}")]
	MaxSizeExceeded { length: usize, limit: usize, message: RenderedMessage },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// text ready to be handed to a channel
pub struct RenderedMessage {
	pub text: String,
	pub size_class: SizeClass,
}

impl RenderedMessage {
	/// Tries constructing a new [RenderedMessage]. Returns [Result::Err] if the
	/// text is longer than `limit`.
	///
	/// # Arguments
	///
	/// * `text` - the rendered message
	///
	/// * `size_class` - template variant that produced `text`
	///
	/// * `limit` - maximum length as measured by [RenderedMessage::len], `None` if the channel has no limit
	pub fn new(
		text: String,
		size_class: SizeClass,
		limit: Option<usize>,
	) -> Result<Self, MessageContentError> {
		let message = Self { text, size_class };

		match limit {
			Some(limit) if message.len() > limit => {
				Err(MessageContentError::MaxSizeExceeded { length: message.len(), limit, message })
			}
			_ => Ok(message),
		}
	}

	/// length in utf-16 code units, which is what the telegram bot api counts
	///
	/// Characters outside the basic multilingual plane (most emoji) count twice.
	pub fn len(&self) -> usize {
		self.text.encode_utf16().count()
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}
}
