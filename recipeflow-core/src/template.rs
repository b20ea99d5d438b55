//! ABOUTME: Template rendering against the recipe context
//! ABOUTME: Tera-backed renderer with Liquid-alias filters and nested fixed-point mode

use serde_json::Value;
use std::collections::HashMap;
use tera::Tera;

use crate::context::Context;
use crate::error::{RecipeError, Result};

/// Upper bound on nested re-render passes.
const MAX_NESTED_PASSES: usize = 10;

/// Placeholder delimiter for protected `{% raw %}` bodies. Private-use
/// codepoint so recipe text cannot collide with it.
const RAW_MARK: char = '\u{F8FF}';

/// Renders template strings and structures against a [`Context`].
///
/// Rendering is pure: the renderer never touches the context. The template
/// namespace is the context snapshot: config entries with artifacts
/// layered on top.
///
/// The expression surface is Tera's (`{{ ... }}` substitution with filter
/// chains, `{% if %}`, `{% for %}`, `{% raw %}`), extended with filters
/// under the names recipes use: `json`, `upcase`, `downcase`, `snakecase`.
/// Tera's own `default`, `replace` and `split` cover the rest.
///
/// # Examples
///
/// ```
/// use recipeflow_core::{Context, TemplateRenderer};
/// use serde_json::json;
///
/// let ctx = Context::new().with_artifact("name", json!("world"));
/// let renderer = TemplateRenderer::new();
///
/// let out = renderer.render_str("hello {{ name | upcase }}", &ctx).unwrap();
/// assert_eq!(out, "hello WORLD");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render a template string in a single pass.
    ///
    /// Strings without `{{`/`{%` tokens are returned unchanged, which also
    /// makes single-pass rendering idempotent on fully-rendered output.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Template` on syntax errors or unresolved
    /// variables.
    pub fn render_str(&self, template: &str, ctx: &Context) -> Result<String> {
        if !has_template_tokens(template) {
            return Ok(template.to_string());
        }
        render_once(template, ctx)
    }

    /// Render to a fixed point: re-render until no template tokens remain,
    /// capped at 10 passes. `{% raw %}` bodies are sliced out up front (and
    /// on every pass, for raw blocks surfaced by intermediate renders) and
    /// spliced back afterwards, so protected content is never re-rendered.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Template` on syntax errors, on a stalled
    /// render (tokens that no pass resolves), or past the pass cap.
    pub fn render_nested(&self, template: &str, ctx: &Context) -> Result<String> {
        let mut blocks: Vec<String> = Vec::new();
        let mut current = protect_raw_blocks(template, &mut blocks);

        let mut passes = 0;
        while has_template_tokens(&current) {
            if passes == MAX_NESTED_PASSES {
                return Err(RecipeError::Template {
                    message: format!(
                        "nested rendering did not reach a fixed point within {MAX_NESTED_PASSES} passes"
                    ),
                });
            }
            let rendered = render_once(&current, ctx)?;
            let rendered = protect_raw_blocks(&rendered, &mut blocks);
            if rendered == current {
                return Err(RecipeError::Template {
                    message: "nested rendering stalled with unresolved template tokens".to_string(),
                });
            }
            current = rendered;
            passes += 1;
        }

        Ok(restore_raw_blocks(&current, &blocks))
    }

    /// Structurally render a JSON value: string leaves are rendered (nested
    /// or single-pass per `nested`), sequences and mappings are walked, and
    /// other scalars pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Template` when any string leaf fails to
    /// render.
    pub fn render_value(&self, value: &Value, ctx: &Context, nested: bool) -> Result<Value> {
        match value {
            Value::String(s) => {
                let rendered = if nested {
                    self.render_nested(s, ctx)?
                } else {
                    self.render_str(s, ctx)?
                };
                Ok(Value::String(rendered))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_value(item, ctx, nested))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.render_value(v, ctx, nested)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Whether a string still carries template syntax.
#[must_use]
pub fn has_template_tokens(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

fn render_once(template: &str, ctx: &Context) -> Result<String> {
    let tera_ctx = tera::Context::from_value(Value::Object(ctx.snapshot())).map_err(|e| {
        RecipeError::Template {
            message: format!("context is not renderable: {e}"),
        }
    })?;
    engine()
        .render_str(template, &tera_ctx)
        .map_err(|e| RecipeError::Template {
            message: error_chain(&e),
        })
}

fn engine() -> Tera {
    let mut tera = Tera::default();
    tera.register_filter("json", json_filter);
    tera.register_filter("upcase", upcase_filter);
    tera.register_filter("downcase", downcase_filter);
    tera.register_filter("snakecase", snakecase_filter);
    tera
}

/// Flatten a tera error and its cause chain into one message.
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Replace every `{% raw %}...{% endraw %}` span with an inert placeholder,
/// pushing the inner body onto `blocks`.
fn protect_raw_blocks(input: &str, blocks: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        let Some((before, body, after)) = split_raw_block(rest) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(before);
        out.push_str(&format!("{RAW_MARK}{}{RAW_MARK}", blocks.len()));
        blocks.push(body.to_string());
        rest = after;
    }
}

/// Find the first raw block, returning (text before, inner body, text after).
fn split_raw_block(input: &str) -> Option<(&str, &str, &str)> {
    let mut search_from = 0;
    loop {
        let open = input[search_from..].find("{%")? + search_from;
        let open_end = input[open..].find("%}")? + open + 2;
        let tag = input[open + 2..open_end - 2].trim_matches('-').trim();
        if tag != "raw" {
            search_from = open_end;
            continue;
        }
        let close = input[open_end..].find("{%").and_then(|mut at| {
            at += open_end;
            loop {
                let end = input[at..].find("%}")? + at + 2;
                let tag = input[at + 2..end - 2].trim_matches('-').trim();
                if tag == "endraw" {
                    return Some((at, end));
                }
                at = input[end..].find("{%")? + end;
            }
        })?;
        return Some((&input[..open], &input[open_end..close.0], &input[close.1..]));
    }
}

fn restore_raw_blocks(input: &str, blocks: &[String]) -> String {
    let mut out = input.to_string();
    for (i, body) in blocks.iter().enumerate() {
        out = out.replace(&format!("{RAW_MARK}{i}{RAW_MARK}"), body);
    }
    out
}

fn json_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let pretty = args.get("pretty").and_then(Value::as_bool).unwrap_or(false);
    let encoded = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| tera::Error::msg(format!("json filter failed: {e}")))?;
    Ok(Value::String(encoded))
}

fn upcase_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("upcase filter expects a string"))?;
    Ok(Value::String(s.to_uppercase()))
}

fn downcase_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("downcase filter expects a string"))?;
    Ok(Value::String(s.to_lowercase()))
}

fn snakecase_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("snakecase filter expects a string"))?;

    let mut out = String::with_capacity(s.len());
    let mut prev_lower_or_digit = false;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() {
                if prev_lower_or_digit {
                    out.push('_');
                }
                out.extend(ch.to_lowercase());
                prev_lower_or_digit = false;
            } else {
                out.push(ch);
                prev_lower_or_digit = true;
            }
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
            prev_lower_or_digit = false;
        }
    }
    Ok(Value::String(out.trim_end_matches('_').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::new()
            .with_artifact("name", json!("alice"))
            .with_artifact("count", json!(3))
            .with_artifact("items", json!(["a", "b"]))
            .with_config("root", json!("/srv"))
    }

    #[test]
    fn test_variable_substitution() {
        let renderer = TemplateRenderer::new();
        let out = renderer.render_str("{{ name }} has {{ count }}", &ctx()).unwrap();
        assert_eq!(out, "alice has 3");
    }

    #[test]
    fn test_config_fallback_and_artifact_shadowing() {
        let renderer = TemplateRenderer::new();
        assert_eq!(renderer.render_str("{{ root }}", &ctx()).unwrap(), "/srv");

        let shadowed = ctx().with_artifact("root", json!("/tmp"));
        assert_eq!(renderer.render_str("{{ root }}", &shadowed).unwrap(), "/tmp");
    }

    #[test]
    fn test_filter_chain() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render_str("{{ name | upcase | replace(from=\"A\", to=\"4\") }}", &ctx())
            .unwrap();
        assert_eq!(out, "4LICE");
    }

    #[test]
    fn test_default_filter_for_missing_variable() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render_str("{{ missing | default(value=\"fallback\") }}", &ctx())
            .unwrap();
        assert_eq!(out, "fallback");
    }

    #[test]
    fn test_json_filter() {
        let renderer = TemplateRenderer::new();
        let out = renderer.render_str("{{ items | json }}", &ctx()).unwrap();
        assert_eq!(out, r#"["a","b"]"#);
    }

    #[test]
    fn test_snakecase_filter() {
        let renderer = TemplateRenderer::new();
        let ctx = Context::new().with_artifact("title", json!("My FancyTitle v2"));
        let out = renderer.render_str("{{ title | snakecase }}", &ctx).unwrap();
        assert_eq!(out, "my_fancy_title_v2");
    }

    #[test]
    fn test_if_and_for_tags() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render_str(
                "{% if count > 2 %}{% for i in items %}[{{ i }}]{% endfor %}{% else %}none{% endif %}",
                &ctx(),
            )
            .unwrap();
        assert_eq!(out, "[a][b]");
    }

    #[test]
    fn test_plain_string_passes_through_unchanged() {
        let renderer = TemplateRenderer::new();
        let input = "no tokens here, just { braces }";
        assert_eq!(renderer.render_str(input, &ctx()).unwrap(), input);
    }

    #[test]
    fn test_syntax_error_is_template_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer.render_str("{{ name", &ctx()).unwrap_err();
        assert!(matches!(err, RecipeError::Template { .. }));
    }

    #[test]
    fn test_nested_render_reaches_fixed_point() {
        let renderer = TemplateRenderer::new();
        let ctx = Context::new()
            .with_artifact("outer", json!("{{ inner }}!"))
            .with_artifact("inner", json!("deep"));

        assert_eq!(renderer.render_nested("{{ outer }}", &ctx).unwrap(), "deep!");
        // Single-pass rendering leaves the intermediate template intact.
        assert_eq!(renderer.render_str("{{ outer }}", &ctx).unwrap(), "{{ inner }}!");
    }

    #[test]
    fn test_nested_render_protects_raw_blocks() {
        let renderer = TemplateRenderer::new();
        let ctx = Context::new().with_artifact("name", json!("alice"));

        let out = renderer
            .render_nested("{% raw %}{{ name }}{% endraw %} is {{ name }}", &ctx)
            .unwrap();
        assert_eq!(out, "{{ name }} is alice");
    }

    #[test]
    fn test_nested_render_protects_raw_surfaced_by_artifacts() {
        let renderer = TemplateRenderer::new();
        let ctx = Context::new()
            .with_artifact("wrapped", json!("{% raw %}{{ keep }}{% endraw %}"))
            .with_artifact("keep", json!("should not appear"));

        let out = renderer.render_nested("{{ wrapped }}", &ctx).unwrap();
        assert_eq!(out, "{{ keep }}");
    }

    #[test]
    fn test_nested_render_detects_runaway_templates() {
        let renderer = TemplateRenderer::new();
        let ctx = Context::new().with_artifact("cycle", json!("{{ cycle }}"));

        let err = renderer.render_nested("{{ cycle }}", &ctx).unwrap_err();
        assert!(matches!(err, RecipeError::Template { .. }));
    }

    #[test]
    fn test_render_value_walks_structures() {
        let renderer = TemplateRenderer::new();
        let value = json!({
            "greeting": "hi {{ name }}",
            "nested": {"count": "{{ count }}", "keep": 7},
            "list": ["{{ name }}", true]
        });

        let rendered = renderer.render_value(&value, &ctx(), false).unwrap();
        assert_eq!(
            rendered,
            json!({
                "greeting": "hi alice",
                "nested": {"count": "3", "keep": 7},
                "list": ["alice", true]
            })
        );
    }
}
