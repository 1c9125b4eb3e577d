//! Rendering of provider URL templates and path templates.
//!
//! Templates are [tera](https://keats.github.io/tera/) templates rendered against a small fixed
//! context:
//!
//! - `Version`: the resolved version string, when one is known
//! - `Provider`: the decoded [`ProviderData`] (`Provider.Scheme`, `Provider.Host`,
//!   `Provider.Path`, `Provider.Query.<key>`)
//!
//! Field references may be written with a leading dot (`{{ .Version }}`) as is customary in
//! existing prebuilt configurations; the dot is dropped before handing the template to tera.
//!
//! Two functions are available in addition to the tera builtins:
//!
//! - `trimPrefix(prefix="v", s=Version)` strips `prefix` from the start of `s` if present
//! - `tpl(template=Provider.Query.asset)` renders a template that is stored in a value of the
//!   context, against the same context.  This is how the `asset` query parameter of a `github://`
//!   specifier gets the resolved version substituted into it.
use crate::{Result, dsn::ProviderData, error};
use regex::{Captures, Regex};
use serde::Serialize;
use snafu::ResultExt;
use std::{borrow::Cow, collections::HashMap, sync::LazyLock};
use tera::{Context, Tera, Value};

/// Bound on how deeply `tpl` may recurse, which stops self-referencing templates.
const MAX_NESTING: usize = 8;

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("BUG: tag pattern is valid"));

static DOT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\s({\[,=|~+!-])\.([A-Za-z_])").expect("BUG: field pattern is valid")
});

/// The values a template can refer to.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderData>,
}

impl TemplateData {
    pub fn with_provider(provider: &ProviderData) -> Self {
        Self {
            version: None,
            provider: Some(provider.clone()),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Render `template` against `data`.
///
/// Fails with [`error::Error::Template`] if the template does not parse, or refers to a value
/// that is not in the context.
pub fn render(template: &str, data: &TemplateData) -> Result<String> {
    let context = Context::from_serialize(data).with_context(|_| error::TemplateSnafu {
        template: template.to_string(),
    })?;

    render_nested(template, &context, 0).with_context(|_| error::TemplateSnafu {
        template: template.to_string(),
    })
}

fn render_nested(template: &str, context: &Context, depth: usize) -> tera::Result<String> {
    if depth > MAX_NESTING {
        return Err(tera::Error::msg(format!(
            "`tpl` nested more than {MAX_NESTING} levels deep"
        )));
    }

    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.register_function("trimPrefix", trim_prefix);

    let nested_context = context.clone();
    tera.register_function("tpl", move |args: &HashMap<String, Value>| {
        let template = string_arg(args, "tpl", "template")?;
        render_nested(template, &nested_context, depth + 1).map(Value::String)
    });

    tera.render_str(&strip_leading_dots(template), context)
}

fn trim_prefix(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let prefix = string_arg(args, "trimPrefix", "prefix")?;
    let s = string_arg(args, "trimPrefix", "s")?;

    Ok(Value::String(s.strip_prefix(prefix).unwrap_or(s).to_string()))
}

fn string_arg<'a>(
    args: &'a HashMap<String, Value>,
    function: &str,
    name: &str,
) -> tera::Result<&'a str> {
    match args.get(name) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(tera::Error::msg(format!(
            "`{function}` expects argument `{name}` to be a string, got {other}"
        ))),
        None => Err(tera::Error::msg(format!(
            "`{function}` is missing required argument `{name}`"
        ))),
    }
}

/// Rewrite `.Field` references inside `{{ }}` and `{% %}` tags to the bare `Field` form tera
/// understands.  Text outside of tags is left alone.
fn strip_leading_dots(template: &str) -> Cow<'_, str> {
    TAG.replace_all(template, |caps: &Captures<'_>| {
        DOT_FIELD.replace_all(&caps[0], "${1}${2}").into_owned()
    })
}
