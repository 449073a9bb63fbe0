//! Template expansion for definition files.
//!
//! Definition files may reference the environment:
//!
//! - `{{ env "NAME" }}` expands to the variable, or to nothing when unset.
//! - `{{ env "NAME" "default" }}` falls back to the default.
//! - `{{ must_env "NAME" }}` fails when the variable is unset.

use crate::error::{ConfigError, Result};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Expands every template expression in `content`.
///
/// `location` names the source in error messages; `lookup` resolves
/// environment variables.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` for an unset `must_env` variable and
/// `ConfigError::TemplateError` for malformed expressions.
pub fn expand<F>(content: &str, location: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or_else(|| template_error("unterminated '{{'", location))?;

        out.push_str(&evaluate(after_open[..end].trim(), location, &lookup)?);
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

fn evaluate<F>(expr: &str, location: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let (function, args) = expr
        .split_once(char::is_whitespace)
        .unwrap_or((expr, ""));
    let args = parse_args(args, location)?;

    match (function, args.as_slice()) {
        ("env", [name]) => Ok(lookup(name).unwrap_or_default()),
        ("env", [name, default]) => Ok(lookup(name).unwrap_or_else(|| default.clone())),
        ("must_env", [name]) => lookup(name).ok_or_else(|| {
            ConfigError::MissingEnvVar {
                name: name.clone(),
            }
            .into()
        }),
        ("env" | "must_env", _) => Err(template_error(
            format!("wrong number of arguments to {function}"),
            location,
        )),
        _ => Err(template_error(format!("unknown function '{function}'"), location)),
    }
}

/// Splits a list of double-quoted string literals.
fn parse_args(input: &str, location: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = input.trim().chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if c != '"' {
            return Err(template_error(
                format!("expected a quoted string, found '{c}'"),
                location,
            ));
        }

        let mut arg = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' => match chars.next() {
                    Some(escaped) => arg.push(escaped),
                    None => break,
                },
                _ => arg.push(c),
            }
        }
        if !closed {
            return Err(template_error("unterminated string", location));
        }
        args.push(arg);
    }
    Ok(args)
}

fn template_error(message: impl Into<String>, location: &str) -> crate::error::RolloutError {
    ConfigError::TemplateError {
        message: message.into(),
        location: location.to_string(),
    }
    .into()
}
