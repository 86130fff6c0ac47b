use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;
use tracing::warn;

// Hex-Rays appends this when it could not decompile everything; anything past
// the marker is garbage, so extraction treats it as end-of-input.
const FAILURE_MARKER: &str = "decompilation failure(s)";

// Last identifier token immediately before an opening parenthesis, preceded
// by whitespace or a scope prefix.
static DECLARED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s[a-zA-Z0-9_:<>]+\(").unwrap());

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("function body starting at line {0} has no closing brace")]
    UnterminatedFunction(usize),
}

/// One decompiled function as it appeared in the dump. Immutable once built.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    /// 1-based line number of the opening-brace line.
    pub start_line: usize,
    /// Bare identifier from the declaration line; empty when none was found.
    pub short_name: String,
    /// Raw signature line, kept for diagnostics.
    pub declaration: String,
    /// Everything between the braces, line separators preserved.
    pub body: String,
}

/// Extracts the bare function name from a declaration line, or `""` if the
/// line holds nothing recognizable.
pub fn function_name_from_line(line: &str) -> &str {
    match DECLARED_NAME.find(line) {
        Some(m) => {
            let found = m.as_str();
            &found[1..found.len() - 1]
        }
        None => "",
    }
}

/// Segments a raw dump into function records, in source order.
///
/// A function starts at a line containing `{`; the preceding line is its
/// declaration. The body runs until the next line that begins with `}`.
/// The decompiler failure marker ends extraction normally; running out of
/// input inside an open body does not.
pub fn extract(text: &str) -> Result<Vec<FunctionRecord>, ExtractError> {
    let mut records = Vec::new();
    let mut lines = text.lines().peekable();
    let mut line_no = 0usize;

    'stream: loop {
        let mut current = "";
        let mut previous = "";

        // Scan for the next function start.
        while !current.contains('{') {
            previous = current;
            current = match lines.next() {
                Some(line) => line,
                None => break 'stream,
            };
            line_no += 1;

            if current.contains(FAILURE_MARKER) {
                break 'stream;
            }
        }

        let start_line = line_no;
        let short_name = function_name_from_line(previous).to_string();
        let declaration = previous.to_string();
        if short_name.is_empty() {
            warn!(line = start_line, declaration = %declaration, "no function name in declaration");
        }

        let mut body = String::new();
        let mut body_lines = 0usize;
        loop {
            let Some(&next) = lines.peek() else {
                return Err(ExtractError::UnterminatedFunction(start_line));
            };
            if next.starts_with('}') {
                break;
            }
            lines.next();
            body.push_str(next);
            body.push('\n');
            body_lines += 1;
        }

        lines.next(); // closing brace
        line_no += body_lines + 1;

        records.push(FunctionRecord {
            start_line,
            short_name,
            declaration,
            body,
        });
    }

    Ok(records)
}
