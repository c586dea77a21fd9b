//! Directive text tokenizer.
//!
//! Turns raw directive text into logical lines (joining `\` continuations,
//! dropping comments and blanks) and splits each line into arguments,
//! honouring double-quoted strings with backslash escapes.

use crate::engine::CompileErrorKind;

/// One directive with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub line: usize,
    pub args: Vec<String>,
}

/// Split directive text into tokenized logical lines.
pub fn logical_lines(text: &str) -> Result<Vec<LogicalLine>, (usize, CompileErrorKind)> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    let mut start_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if pending.is_empty() {
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            start_line = line_no;
        }

        match trimmed.strip_suffix('\\') {
            Some(head) => {
                pending.push_str(head);
                pending.push(' ');
            }
            None => {
                pending.push_str(trimmed);
                let args = tokenize(&pending).map_err(|kind| (start_line, kind))?;
                if !args.is_empty() {
                    lines.push(LogicalLine { line: start_line, args });
                }
                pending.clear();
            }
        }
    }

    let args = tokenize(&pending).map_err(|kind| (start_line, kind))?;
    if !args.is_empty() {
        lines.push(LogicalLine { line: start_line, args });
    }

    Ok(lines)
}

fn tokenize(line: &str) -> Result<Vec<String>, CompileErrorKind> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some('"') => token.push('"'),
                        Some(other) => {
                            token.push('\\');
                            token.push(other);
                        }
                        None => token.push('\\'),
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => token.push(other),
                }
            }
            if !closed {
                return Err(CompileErrorKind::UnterminatedQuote);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        args.push(token);
    }

    Ok(args)
}
