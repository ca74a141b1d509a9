//! Output path and command templates like `{dirname}/{stem}.palette-{k}.png`

use std::{
	ffi::OsStr,
	fmt::{self, Display},
	path::Path,
	str::FromStr,
};
use thiserror::Error;

/// The default template for palette JSON files
pub const DEFAULT_PALETTE_JSON: &str = "{path}.palette-{k}.json";

/// A value that can be substituted into a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
	/// The image path as given
	Path,
	/// The image path made absolute
	Abs,
	/// The last component of the image path
	Basename,
	/// The image path without its last component (`.` if there is none)
	Dirname,
	/// The last component of the image path without its extension
	Stem,
	/// The extension of the image path including the leading `.` (empty if there is none)
	Ext,
	/// The palette size
	K,
	/// The number of image clusters
	N,
	/// The image cluster label
	Label,
}

impl Field {
	/// Every field with its placeholder name
	const ALL: [(&'static str, Self); 9] = [
		("path", Self::Path),
		("abs", Self::Abs),
		("basename", Self::Basename),
		("dirname", Self::Dirname),
		("stem", Self::Stem),
		("ext", Self::Ext),
		("k", Self::K),
		("n", Self::N),
		("label", Self::Label),
	];

	/// The placeholder name
	fn name(self) -> &'static str {
		Self::ALL
			.iter()
			.find(|&&(_, field)| field == self)
			.map_or("", |&(name, _)| name)
	}

	/// Whether this field is derived from the image path
	pub const fn needs_path(self) -> bool {
		matches!(
			self,
			Self::Path | Self::Abs | Self::Basename | Self::Dirname | Self::Stem | Self::Ext
		)
	}
}

impl Display for Field {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{{{}}}", self.name())
	}
}

/// Error cases for parsing and rendering templates
#[derive(Debug, Error)]
pub enum TemplateError {
	/// A placeholder name that is not a [`Field`]
	#[error("unknown placeholder {{{0}}}, expected one of {{path}}, {{abs}}, {{basename}}, {{dirname}}, {{stem}}, {{ext}}, {{k}}, {{n}}, {{label}}")]
	Unknown(String),
	/// A `{` without a matching `}`
	#[error("unclosed {{ in template, use {{{{ for a literal {{")]
	Unclosed,
	/// A `}` without a preceding `{`
	#[error("unmatched }} in template, use }}}} for a literal }}")]
	Unmatched,
	/// A field that has no value where the template is used
	#[error("{0} is not available here")]
	Unavailable(Field),
	/// The current directory is needed for `{abs}` but could not be read
	#[error("failed to get the current directory: {0}")]
	CurrentDir(#[from] std::io::Error),
}

/// A piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
	/// Copied as-is
	Literal(String),
	/// Replaced by the value of the field
	Field(Field),
}

/// A parsed template
///
/// `{name}` is replaced by the value of the [`Field`] called `name`.
/// `{{` and `}}` produce a literal `{` and `}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
	/// The original text
	text: String,
	/// Literals and placeholders in order
	segments: Vec<Segment>,
}

/// The values available when rendering a template
#[derive(Debug, Clone, Copy, Default)]
pub struct Context<'a> {
	/// Image path
	pub path: Option<&'a str>,
	/// Palette size
	pub k: usize,
	/// Number of image clusters
	pub n: Option<usize>,
	/// Image cluster label
	pub label: Option<usize>,
}

impl Template {
	/// The fields used by the template
	pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
		self.segments.iter().filter_map(|segment| match segment {
			Segment::Field(field) => Some(*field),
			Segment::Literal(_) => None,
		})
	}

	/// Ensure the template only uses fields that `available` allows
	pub fn check(&self, available: impl Fn(Field) -> bool) -> Result<(), TemplateError> {
		match self.fields().find(|&field| !available(field)) {
			Some(field) => Err(TemplateError::Unavailable(field)),
			None => Ok(()),
		}
	}

	/// Substitute every placeholder
	pub fn render(&self, context: &Context) -> Result<String, TemplateError> {
		let mut out = String::with_capacity(self.text.len());
		for segment in &self.segments {
			match segment {
				Segment::Literal(text) => out.push_str(text),
				Segment::Field(field) => out.push_str(&value(*field, context)?),
			}
		}
		Ok(out)
	}
}

/// The value of a field in the given context
fn value(field: Field, context: &Context) -> Result<String, TemplateError> {
	let unavailable = || TemplateError::Unavailable(field);
	let path = || context.path.map(Path::new).ok_or_else(unavailable);
	let lossy = |s: Option<&OsStr>| s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();

	Ok(match field {
		Field::Path => context.path.ok_or_else(unavailable)?.to_owned(),
		Field::Abs => {
			let path = path()?;
			if path.is_absolute() {
				path.to_string_lossy().into_owned()
			} else {
				std::env::current_dir()?.join(path).to_string_lossy().into_owned()
			}
		}
		Field::Basename => lossy(path()?.file_name()),
		Field::Dirname => match path()?.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
			_ => ".".to_owned(),
		},
		Field::Stem => lossy(path()?.file_stem()),
		Field::Ext => path()?
			.extension()
			.map(|ext| format!(".{}", ext.to_string_lossy()))
			.unwrap_or_default(),
		Field::K => context.k.to_string(),
		Field::N => context.n.ok_or_else(unavailable)?.to_string(),
		Field::Label => context.label.ok_or_else(unavailable)?.to_string(),
	})
}

impl FromStr for Template {
	type Err = TemplateError;

	fn from_str(text: &str) -> Result<Self, Self::Err> {
		let mut segments = Vec::new();
		let mut literal = String::new();
		let mut chars = text.chars().peekable();

		while let Some(c) = chars.next() {
			match c {
				'{' if chars.peek() == Some(&'{') => {
					chars.next();
					literal.push('{');
				}
				'}' if chars.peek() == Some(&'}') => {
					chars.next();
					literal.push('}');
				}
				'{' => {
					let mut name = String::new();
					loop {
						match chars.next() {
							Some('}') => break,
							Some(c) => name.push(c),
							None => return Err(TemplateError::Unclosed),
						}
					}

					let field = Field::ALL
						.iter()
						.find(|&&(field_name, _)| field_name == name.trim())
						.map(|&(_, field)| field)
						.ok_or(TemplateError::Unknown(name))?;

					if !literal.is_empty() {
						segments.push(Segment::Literal(std::mem::take(&mut literal)));
					}
					segments.push(Segment::Field(field));
				}
				'}' => return Err(TemplateError::Unmatched),
				c => literal.push(c),
			}
		}

		if !literal.is_empty() {
			segments.push(Segment::Literal(literal));
		}

		Ok(Self { text: text.to_owned(), segments })
	}
}

impl Display for Template {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.text)
	}
}
