//! Renders alert batches via jinja2 style templates.
//!
//! Every template a channel needs is compiled once at startup. All files of the
//! template directory are loaded, so they may extend or include each other. A
//! name the directory doesn't provide falls back to the templates bundled with
//! the binary.

use std::{
	collections::HashSet,
	path::{Path, PathBuf},
};

use tera::Tera;
use thiserror::Error;

use crate::{
	alert,
	dispatcher::NotifyError,
	rendered_alert::{MessageContentError, RenderedMessage, SizeClass},
};

/// templates shipped with the binary, used if the template directory doesn't override them
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
	("html.j2", include_str!("../templates/html.j2")),
	("too_long.html.j2", include_str!("../templates/too_long.html.j2")),
	("markdown.md.j2", include_str!("../templates/markdown.md.j2")),
	("text.j2", include_str!("../templates/text.j2")),
];

/// templates with this suffix get html escaping of all substituted values
const HTML_SUFFIX: &str = "html.j2";

/// Startup error while loading templates
#[derive(Error, Debug)]
pub enum TemplateError {
	#[error("template `{0}` not found in template directory or builtin templates")]
	NotFound(String),
	#[error("failed to compile template `{name}`: {reason}")]
	Compile { name: String, reason: String },
	#[error("failed to load templates from {}: {reason}", .dir.display())]
	Directory { dir: PathBuf, reason: String },
}

/// Error while rendering a batch, the template referenced something missing or a filter failed
#[derive(Error, Debug, Clone)]
#[error("failed to render template `{template}`: {reason}")]
pub struct RenderError {
	pub template: String,
	pub reason: String,
}

/// flatten the nested tera error chain into a single line
fn describe(err: &tera::Error) -> String {
	let mut reason = err.to_string();
	let mut source = std::error::Error::source(err);

	while let Some(err) = source {
		reason.push_str(": ");
		reason.push_str(&err.to_string());
		source = err.source();
	}

	reason
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// template names used by one channel
pub struct ChannelTemplates {
	/// template used for every message
	pub primary: String,
	/// shorter template used if the primary one exceeds the channel's size limit
	pub too_long: Option<String>,
}

impl ChannelTemplates {
	pub fn new(primary: impl Into<String>) -> Self {
		Self { primary: primary.into(), too_long: None }
	}

	pub fn with_too_long(mut self, too_long: impl Into<String>) -> Self {
		self.too_long = Some(too_long.into());
		self
	}

	fn names(&self) -> impl Iterator<Item = &str> {
		std::iter::once(self.primary.as_str()).chain(self.too_long.as_deref())
	}
}

/// Alert renderer
pub struct AlertRenderer {
	tera: Tera,
}

impl std::fmt::Debug for AlertRenderer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AlertRenderer")
			.field("templates", &self.tera.get_template_names().collect::<Vec<_>>())
			.finish()
	}
}

impl AlertRenderer {
	fn empty() -> Self {
		Self::with_tera(Tera::default())
	}

	fn with_tera(mut tera: Tera) -> Self {
		tera.autoescape_on(vec![HTML_SUFFIX]);

		Self { tera }
	}

	/// parse every file below `dir`, inheritance chains are built once the builtins are added
	fn parse_dir(dir: &Path) -> Result<Self, TemplateError> {
		let directory_error = |reason| TemplateError::Directory { dir: dir.to_owned(), reason };

		let dir_str = dir.to_str().ok_or_else(|| directory_error("path is not valid utf-8".to_owned()))?;
		if dir_str.contains('*') {
			return Err(directory_error("path must not contain `*`".to_owned()));
		}

		let tera = Tera::parse(&format!("{}/**/*", dir_str.trim_end_matches('/')))
			.map_err(|err| directory_error(describe(&err)))?;

		Ok(Self::with_tera(tera))
	}

	/// Compile all templates used by `channels`.
	///
	/// # Arguments
	///
	/// * `template_dir` - directory whose files take precedence over the builtin templates
	///
	/// * `channels` - templates of every configured channel
	pub fn load<'a>(
		template_dir: Option<&Path>,
		channels: impl IntoIterator<Item = &'a ChannelTemplates>,
	) -> Result<Self, TemplateError> {
		let mut renderer = match template_dir {
			Some(dir) => Self::parse_dir(dir)?,
			None => Self::empty(),
		};

		let mut builtins = Vec::new();
		let mut seen = HashSet::new();

		for name in channels.into_iter().flat_map(ChannelTemplates::names) {
			if !seen.insert(name.to_owned()) {
				continue;
			}

			if renderer.has_template(name) {
				if let Some(dir) = template_dir {
					tracing::info!("loading template {name} from {}", dir.display());
				}
				continue;
			}

			let (_, source) = BUILTIN_TEMPLATES
				.iter()
				.find(|(builtin, _)| *builtin == name)
				.ok_or_else(|| TemplateError::NotFound(name.to_owned()))?;

			tracing::debug!("using builtin template {name}");
			builtins.push((name.to_owned(), *source));
		}

		// also links the directory templates, which may extend a builtin one
		renderer.tera.add_raw_templates(builtins).map_err(|err| {
			let name = template_dir.map_or_else(|| "builtin".to_owned(), |dir| dir.display().to_string());
			TemplateError::Compile { name, reason: describe(&err) }
		})?;

		Ok(renderer)
	}

	/// Compile templates given as `(name, source)` pairs.
	pub fn from_raw<'a>(
		templates: impl IntoIterator<Item = (&'a str, &'a str)>,
	) -> Result<Self, TemplateError> {
		let mut renderer = Self::empty();

		for (name, source) in templates {
			renderer.add_raw(name, source)?;
		}

		Ok(renderer)
	}

	fn add_raw(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
		self.tera
			.add_raw_template(name, source)
			.map_err(|err| TemplateError::Compile { name: name.to_owned(), reason: describe(&err) })
	}

	pub fn has_template(&self, name: &str) -> bool {
		self.tera.get_template_names().any(|template| template == name)
	}

	/// Render `batch` with the template called `name`.
	pub fn render(&self, batch: &alert::Data, name: &str) -> Result<String, RenderError> {
		let error = |err: tera::Error| RenderError { template: name.to_owned(), reason: describe(&err) };

		let context = tera::Context::from_serialize(batch).map_err(error)?;

		self.tera.render(name, &context).map_err(error)
	}

	/// Render the message a channel sends for `batch`, honoring its size limit.
	///
	/// If the primary template exceeds `limit` the `too_long` template is
	/// rendered instead. The result is never truncated: if there's no fallback
	/// or the fallback is too long as well [NotifyError::MessageTooLong] is
	/// returned.
	///
	/// # Arguments
	///
	/// * `batch` - the (filtered) alert batch
	///
	/// * `templates` - templates of the channel
	///
	/// * `limit` - maximum message length of the channel
	pub fn render_message(
		&self,
		batch: &alert::Data,
		templates: &ChannelTemplates,
		limit: Option<usize>,
	) -> Result<RenderedMessage, NotifyError> {
		let text = self.render(batch, &templates.primary)?;

		let fallback = match RenderedMessage::new(text, SizeClass::Normal, limit) {
			Ok(message) => return Ok(message),
			Err(MessageContentError::MaxSizeExceeded { length, limit, .. }) => {
				let too_long = match &templates.too_long {
					Some(too_long) => too_long,
					None => return Err(NotifyError::MessageTooLong { length, limit }),
				};

				tracing::info!(
					"message length {length} exceeds limit of {limit}, falling back to template {too_long}"
				);
				too_long
			}
		};

		let text = self.render(batch, fallback)?;

		RenderedMessage::new(text, SizeClass::Oversized, limit).map_err(
			|MessageContentError::MaxSizeExceeded { length, limit, .. }| NotifyError::MessageTooLong {
				length,
				limit,
			},
		)
	}
}
