//! `forward` directive parsing
//!
//! ```text
//! forward FROM TO... {
//!     policy random|round_robin|sequential
//!     max_fails N
//!     except ZONE...
//! }
//! ```
//!
//! The block is optional. `#` starts a comment that runs to end of line.

use tracing::debug;

use super::policy::Policy;
use crate::config::ForwardSettings;
use crate::error::{ForwardError, Result};

#[derive(Debug)]
struct Token {
    text: String,
    line: usize,
}

/// Parse a single `forward` directive into settings.
///
/// Upstream addresses are kept verbatim; they are validated when the
/// settings are turned into a [`super::Forward`].
pub fn parse_forward(text: &str) -> Result<ForwardSettings> {
    let mut tokens = tokenize(text).into_iter().peekable();

    let head = tokens
        .next()
        .ok_or_else(|| invalid("empty forward directive".to_string()))?;
    if head.text != "forward" {
        return Err(invalid(format!(
            "line {}: expected 'forward', found '{}'",
            head.line, head.text
        )));
    }

    let mut args = Vec::new();
    let mut has_block = false;
    while let Some(tok) = tokens.next_if(|t| t.line == head.line) {
        match tok.text.as_str() {
            "{" => {
                has_block = true;
                break;
            }
            "}" => return Err(unexpected(&tok)),
            _ => args.push(tok.text),
        }
    }

    let mut args = args.into_iter();
    let mut settings = ForwardSettings {
        from: args
            .next()
            .ok_or_else(|| invalid(format!("line {}: missing FROM zone", head.line)))?,
        ..ForwardSettings::default()
    };
    settings.upstreams = args.collect();
    if settings.upstreams.is_empty() {
        return Err(invalid(format!(
            "line {}: missing TO upstreams",
            head.line
        )));
    }

    // A brace on its own line still opens the block.
    if !has_block {
        if let Some(tok) = tokens.next_if(|t| t.text == "{") {
            debug!(line = tok.line, "Block opened on its own line");
            has_block = true;
        }
    }

    if has_block {
        let mut closed = false;
        let mut properties: Vec<(usize, Vec<String>)> = Vec::new();
        for tok in tokens.by_ref() {
            match tok.text.as_str() {
                "}" => {
                    closed = true;
                    break;
                }
                "{" => return Err(unexpected(&tok)),
                _ => match properties.last_mut() {
                    Some((line, words)) if *line == tok.line => words.push(tok.text),
                    _ => properties.push((tok.line, vec![tok.text])),
                },
            }
        }
        if !closed {
            return Err(invalid("unterminated forward block".to_string()));
        }

        for (line, words) in properties {
            apply_property(&mut settings, line, words)?;
        }
    }

    if let Some(tok) = tokens.next() {
        if tok.text == "forward" {
            return Err(invalid(format!(
                "line {}: only one forward directive is supported",
                tok.line
            )));
        }
        return Err(unexpected(&tok));
    }

    Ok(settings)
}

fn apply_property(settings: &mut ForwardSettings, line: usize, words: Vec<String>) -> Result<()> {
    let mut words = words.into_iter();
    let name = words.next().unwrap_or_default();
    let args: Vec<String> = words.collect();

    match name.as_str() {
        "policy" => {
            let token = single_arg(&name, line, &args)?;
            // Reject unknown names here so the error points at the directive.
            Policy::resolve(token)?;
            settings.policy = token.to_string();
        }
        "max_fails" => {
            let raw = single_arg(&name, line, &args)?;
            settings.max_fails = raw.parse().map_err(|_| {
                invalid(format!(
                    "line {}: max_fails must be a non-negative number, found '{}'",
                    line, raw
                ))
            })?;
        }
        "except" => {
            if args.is_empty() {
                return Err(invalid(format!(
                    "line {}: except requires at least one zone",
                    line
                )));
            }
            settings.except.extend(args);
        }
        other => {
            return Err(invalid(format!(
                "line {}: unknown property '{}'",
                line, other
            )))
        }
    }

    Ok(())
}

fn single_arg<'a>(name: &str, line: usize, args: &'a [String]) -> Result<&'a str> {
    match args {
        [arg] => Ok(arg.as_str()),
        _ => Err(invalid(format!(
            "line {}: {} takes exactly one argument, found {}",
            line,
            name,
            args.len()
        ))),
    }
}

/// Split into words, with braces always standing alone
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };

        for word in line.split_whitespace() {
            let mut rest = word;
            while !rest.is_empty() {
                let split = match rest.find(|c: char| c == '{' || c == '}') {
                    Some(0) => 1,
                    Some(pos) => pos,
                    None => rest.len(),
                };
                tokens.push(Token {
                    text: rest[..split].to_string(),
                    line: line_no,
                });
                rest = &rest[split..];
            }
        }
    }

    tokens
}

fn invalid(msg: String) -> ForwardError {
    ForwardError::InvalidConfig(msg)
}

fn unexpected(tok: &Token) -> ForwardError {
    invalid(format!("line {}: unexpected '{}'", tok.line, tok.text))
}
