use regex_lite::Regex;
use thiserror::Error;

use crate::correlate::OpcodeEntry;
use crate::extract::FunctionRecord;

// Upper bound on the body window kept around a packet-construction call.
// Bodies twice this size get cut down before scoring so the similarity
// engine's DP stays bounded.
const MAX_BLOCK: usize = 1000;

#[derive(Debug, Error)]
pub enum DirectMapError {
    #[error("bad opcode literal {literal:?} in call inside {function}: {source}")]
    BadLiteral {
        literal: String,
        function: String,
        source: std::num::ParseIntError,
    },
    #[error("call pattern identifiers must be plain identifiers, got {0:?}")]
    BadIdentifier(String),
}

/// The packet-construction idiom scanned for in handler bodies: a two-part
/// identifier (class, constructor) whose argument list ends in the opcode
/// literal, e.g. `COutPacket__COutPacket_0(v2, 0x64);`.
pub struct CallPattern {
    underscored: String,
    scoped: String,
    call: Regex,
}

impl CallPattern {
    pub fn new(class_name: &str, ctor_name: &str) -> Result<CallPattern, DirectMapError> {
        for name in [class_name, ctor_name] {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DirectMapError::BadIdentifier(name.to_string()));
            }
        }

        let call = Regex::new(&format!(
            r"{class_name}[_:]+{ctor_name}\((.*, )?[0-9A-Fa-fuhdx]+\);"
        ))
        .map_err(|_| DirectMapError::BadIdentifier(class_name.to_string()))?;

        Ok(CallPattern {
            underscored: format!("{class_name}__{ctor_name}"),
            scoped: format!("{class_name}::{ctor_name}"),
            call,
        })
    }

    /// Whether a function participates in direct mapping at all. Bodies with
    /// no packet-construction call are extraneous and dropped upstream.
    pub fn keep(&self, record: &FunctionRecord) -> bool {
        self.call.is_match(&record.body)
    }

    /// Returns a copy of `record` with the body cut down to at most
    /// MAX_BLOCK characters anchored at the first occurrence of the call
    /// identifier. Bodies under twice that size pass through untouched; a
    /// long body without the identifier comes back empty.
    pub fn trim(&self, record: &FunctionRecord) -> FunctionRecord {
        let body = &record.body;
        if body.len() < MAX_BLOCK * 2 {
            return record.clone();
        }

        let index = match body
            .find(&self.underscored)
            .or_else(|| body.find(&self.scoped))
        {
            Some(index) => index,
            None => {
                return FunctionRecord {
                    body: String::new(),
                    ..record.clone()
                }
            }
        };

        let start = index.saturating_sub(MAX_BLOCK);
        let len = MAX_BLOCK.min(body.len() - index);
        let window = String::from_utf8_lossy(&body.as_bytes()[start..start + len]).into_owned();

        FunctionRecord {
            body: window,
            ..record.clone()
        }
    }

    /// One entry per matching call in the body. A function with several
    /// calls yields several entries; duplicates are resolved later by the
    /// result cleaner.
    pub fn map_direct<'a>(
        &self,
        record: &'a FunctionRecord,
    ) -> Result<Vec<OpcodeEntry<'a>>, DirectMapError> {
        let mut entries = Vec::new();

        for found in self.call.find_iter(&record.body) {
            let call_text = found.as_str();
            let Some(tail) = call_text.rsplit('(').next() else {
                continue;
            };

            // The tail still carries the closing ");", and possibly earlier
            // arguments; the opcode is always the last token.
            let mut literal = &tail[..tail.len() - 2];
            if literal.contains(',') {
                literal = literal.split_whitespace().last().unwrap_or(literal);
            }

            let opcode =
                parse_call_literal(literal).map_err(|source| DirectMapError::BadLiteral {
                    literal: literal.to_string(),
                    function: record.short_name.clone(),
                    source,
                })?;

            entries.push(OpcodeEntry {
                opcode,
                function: Some(record),
            });
        }

        Ok(entries)
    }
}

impl Default for CallPattern {
    fn default() -> CallPattern {
        CallPattern::new("COutPacket", "COutPacket_0").expect("built-in call pattern")
    }
}

// `0x`-prefixed literals parse as hex, optionally with a trailing `u` or `h`
// marker; everything else parses as decimal.
fn parse_call_literal(raw: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(digits) = raw.strip_prefix("0x") {
        let digits = digits.strip_suffix(['u', 'h']).unwrap_or(digits);
        u32::from_str_radix(digits, 16)
    } else {
        raw.parse()
    }
}
