//! Prompt Template System
//!
//! Prompts are built once per flow as an ordered tree of nodes (literal
//! text, field references, conditional blocks, media references) and rendered
//! per request by a small interpreter. Rendering is a pure function of the
//! template and the validated input, so conditional logic can be tested
//! without any model call.
//!
//! ```ignore
//! let template = PromptBuilder::new()
//!     .text("Pet Type: ").field("petType").newline()
//!     .when_present("style", |b| b.text("Style Preference: ").field("style").newline())
//!     .build();
//! let rendered = template.render(&json!({"petType": "cat"}))?;
//! ```

use serde_json::Value;
use std::collections::HashSet;

use crate::ai::schema::ObjectSchema;
use crate::types::{ValidationError, ValidationErrorKind};

/// Text emitted where a media reference sits in the template
pub const MEDIA_PLACEHOLDER: &str = "[attached image]";

/// One node of a prompt template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// Literal text
    Text(String),
    /// Interpolated input field
    Field(String),
    /// Rendered only when the named field is present and non-empty
    IfPresent {
        field: String,
        body: Vec<TemplateNode>,
    },
    /// Data-URI field passed to the backend as a separate attachment
    Media(String),
}

/// Builder for prompt templates
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    nodes: Vec<TemplateNode>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add literal text
    pub fn text(mut self, content: &str) -> Self {
        self.nodes.push(TemplateNode::Text(content.to_string()));
        self
    }

    /// Add a full line of literal text
    pub fn line(self, content: &str) -> Self {
        self.text(content).newline()
    }

    pub fn newline(self) -> Self {
        self.text("\n")
    }

    /// Add a numbered list, one item per line
    pub fn numbered(mut self, items: &[&str]) -> Self {
        for (i, item) in items.iter().enumerate() {
            self = self.line(&format!("{}. {}", i + 1, item));
        }
        self
    }

    /// Interpolate an input field
    pub fn field(mut self, name: &str) -> Self {
        self.nodes.push(TemplateNode::Field(name.to_string()));
        self
    }

    /// Add a block rendered only when `name` is present
    pub fn when_present(mut self, name: &str, body: impl FnOnce(Self) -> Self) -> Self {
        let inner = body(Self::new());
        self.nodes.push(TemplateNode::IfPresent {
            field: name.to_string(),
            body: inner.nodes,
        });
        self
    }

    /// Reference a data-URI field as a multimodal attachment
    pub fn media(mut self, name: &str) -> Self {
        self.nodes.push(TemplateNode::Media(name.to_string()));
        self
    }

    pub fn build(self) -> PromptTemplate {
        PromptTemplate { nodes: self.nodes }
    }
}

/// Immutable prompt template
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    nodes: Vec<TemplateNode>,
}

impl PromptTemplate {
    pub fn builder() -> PromptBuilder {
        PromptBuilder::new()
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// Every field name the template reads, once each, in order of first
    /// appearance
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_fields(&self.nodes, &mut out);
        let mut seen = HashSet::new();
        out.retain(|name| seen.insert(*name));
        out
    }

    /// Field names referenced as media
    pub fn media_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_media(&self.nodes, &mut out);
        out
    }

    /// Check that the template only reads declared fields and holds at most
    /// one media reference. Returns a description of each problem.
    pub fn check_against(&self, schema: &ObjectSchema) -> Vec<String> {
        let mut problems: Vec<String> = self
            .referenced_fields()
            .into_iter()
            .filter(|name| !schema.contains(name))
            .map(|name| format!("template references undeclared field '{}'", name))
            .collect();

        let media = self.media_fields();
        if media.len() > 1 {
            problems.push(format!(
                "template holds {} media references, at most one is allowed",
                media.len()
            ));
        }

        problems
    }

    /// Render the template against a validated input
    ///
    /// Media fields are checked for the `data:image` prefix here, before any
    /// backend request exists.
    pub fn render(&self, input: &Value) -> Result<RenderedPrompt, ValidationError> {
        let mut rendered = RenderedPrompt::default();
        render_nodes(&self.nodes, input, &mut rendered)?;
        Ok(rendered)
    }
}

/// Output of rendering: prompt text plus out-of-band attachments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPrompt {
    pub text: String,
    pub attachments: Vec<MediaAttachment>,
}

/// Binary payload carried as a data URI (`data:<mime>;base64,<data>`)
#[derive(Clone, PartialEq)]
pub struct MediaAttachment {
    pub mime_type: String,
    pub data_uri: String,
}

impl std::fmt::Debug for MediaAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAttachment")
            .field("mime_type", &self.mime_type)
            .field("data_uri", &format_args!("[{} bytes]", self.data_uri.len()))
            .finish()
    }
}

impl MediaAttachment {
    /// Parse an image data URI
    pub fn parse_image(field: &str, uri: &str) -> Result<Self, ValidationError> {
        if !uri.starts_with("data:image") {
            return Err(invalid_media(field, uri));
        }
        let mime_type = uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            mime_type,
            data_uri: uri.to_string(),
        })
    }

    /// Encoded payload after the first comma
    pub fn base64_data(&self) -> &str {
        self.data_uri
            .split_once(',')
            .map_or("", |(_, data)| data)
    }
}

fn invalid_media(field: &str, actual: &str) -> ValidationError {
    let preview: String = actual.chars().take(16).collect();
    ValidationError::new(
        ValidationErrorKind::InvalidMediaFormat,
        "expected a data URI of the form data:image/<type>;base64,<data>",
    )
    .with_field(field)
    .with_comparison("data:image/...", preview)
}

fn render_nodes(
    nodes: &[TemplateNode],
    input: &Value,
    out: &mut RenderedPrompt,
) -> Result<(), ValidationError> {
    for node in nodes {
        match node {
            TemplateNode::Text(text) => out.text.push_str(text),
            TemplateNode::Field(name) => {
                if let Some(value) = input.get(name) {
                    out.text.push_str(&format_value(value));
                }
            }
            TemplateNode::IfPresent { field, body } => {
                if is_present(input.get(field)) {
                    render_nodes(body, input, out)?;
                }
            }
            TemplateNode::Media(name) => {
                let uri = input.get(name).and_then(Value::as_str).unwrap_or_default();
                out.attachments.push(MediaAttachment::parse_image(name, uri)?);
                out.text.push_str(MEDIA_PLACEHOLDER);
            }
        }
    }
    Ok(())
}

/// Absent, `null`, blank strings and empty arrays count as not present
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Interpolation text for a value; numbers in plain decimal form
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or_default();
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn collect_fields<'a>(nodes: &'a [TemplateNode], out: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            TemplateNode::Text(_) => {}
            TemplateNode::Field(name) | TemplateNode::Media(name) => out.push(name),
            TemplateNode::IfPresent { field, body } => {
                out.push(field);
                collect_fields(body, out);
            }
        }
    }
}

fn collect_media<'a>(nodes: &'a [TemplateNode], out: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            TemplateNode::Media(name) => out.push(name),
            TemplateNode::IfPresent { body, .. } => collect_media(body, out),
            _ => {}
        }
    }
}
