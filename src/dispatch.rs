use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;
use tracing::warn;

use crate::correlate::OpcodeEntry;
use crate::extract::{function_name_from_line, FunctionRecord};

// The variable a dispatch root compares against its branch opcodes, e.g.
// `if ( a2 == 981 )`.
static DISPATCH_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"if \( (a[1-5]) == \d{3,4} \)").unwrap());

static HEX_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"0x[0-9A-Fa-f]+").unwrap());
static DEC_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s([0-9]+)").unwrap());

#[derive(Debug, Error)]
pub enum DispatchMapError {
    #[error("bad opcode literal {literal:?} in branch of {root}: {source}")]
    BadLiteral {
        literal: String,
        root: String,
        source: std::num::ParseIntError,
    },
}

/// The set of dispatch-root function names to walk. Injected configuration,
/// so other protocol families can be analyzed without touching the mapper.
#[derive(Debug, Clone)]
pub struct DispatchRoots(Vec<String>);

impl DispatchRoots {
    pub fn new(names: Vec<String>) -> DispatchRoots {
        DispatchRoots(names)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for DispatchRoots {
    fn default() -> DispatchRoots {
        DispatchRoots(
            [
                "CWvsContext__OnPacket",
                "CField__OnPacket",
                "CNpcPool__OnPacket",
                "CMobPool__OnMobPacket",
                "CUserPool__OnPacket",
                "CMinionPool__OnPacket",
                "CLogin__OnPacket",
                "CCashShop__OnPacket",
            ]
            .map(String::from)
            .to_vec(),
        )
    }
}

/// Looks a root up by substring match on the short name, falling back to the
/// scope-resolution spelling (`CField__OnPacket` -> `CField::OnPacket`).
pub fn find_root<'a>(records: &'a [FunctionRecord], root: &str) -> Option<&'a FunctionRecord> {
    records
        .iter()
        .find(|r| r.short_name.contains(root))
        .or_else(|| {
            let scoped = root.replace('_', ":");
            records.iter().find(move |r| r.short_name.contains(&scoped))
        })
}

/// Walks the branch arms of a dispatch root and resolves each arm's opcode
/// literal to the handler it invokes. Arms without a literal, and arms that
/// hit a `break`/`return`/`goto`/`else`/closing brace before any call, yield
/// nothing. An unresolved callee still yields an entry, with no function.
pub fn map_dispatch<'a>(
    root: &FunctionRecord,
    all_functions: &'a [FunctionRecord],
) -> Result<Vec<OpcodeEntry<'a>>, DispatchMapError> {
    let lines: Vec<&str> = root.body.lines().filter(|l| !l.trim().is_empty()).collect();

    let variable = dispatch_variable(&lines);
    let comparison = variable.map(|v| (format!("if ({v} == "), format!("if ( {v} == ")));

    let mut entries = Vec::new();

    for i in 0..lines.len().saturating_sub(1) {
        let line = lines[i];

        let is_head = line.contains("case ")
            || comparison
                .as_ref()
                .is_some_and(|(tight, spaced)| line.contains(tight) || line.contains(spaced));
        if !is_head {
            continue;
        }

        // First invocation after the branch head is the handler; anything
        // that ends the arm first discards it.
        let mut callee = "";
        for next in &lines[i + 1..] {
            if next.contains("break;")
                || next.contains('}')
                || next.contains("return;")
                || next.contains("goto")
                || next.contains("else")
            {
                break;
            }
            callee = function_name_from_line(next);
            if !callee.is_empty() {
                break;
            }
        }
        if callee.is_empty() {
            continue;
        }

        let Some(opcode) = opcode_from_branch_head(line, &root.short_name)? else {
            continue;
        };

        let function = all_functions.iter().find(|f| f.short_name == callee);
        if function.is_none() {
            warn!(callee, opcode, root = %root.short_name, "branch callee has no matching function");
        }

        entries.push(OpcodeEntry { opcode, function });
    }

    Ok(entries)
}

fn dispatch_variable(lines: &[&str]) -> Option<String> {
    lines.iter().find_map(|line| {
        DISPATCH_VARIABLE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

// Hex literal wins when present; otherwise a whitespace-preceded decimal.
fn opcode_from_branch_head(
    line: &str,
    root_name: &str,
) -> Result<Option<u32>, DispatchMapError> {
    if let Some(found) = HEX_LITERAL.find(line) {
        let digits = &found.as_str()[2..];
        return u32::from_str_radix(digits, 16)
            .map(Some)
            .map_err(|source| DispatchMapError::BadLiteral {
                literal: found.as_str().to_string(),
                root: root_name.to_string(),
                source,
            });
    }

    match DEC_LITERAL.captures(line).and_then(|c| c.get(1)) {
        Some(digits) => digits
            .as_str()
            .parse()
            .map(Some)
            .map_err(|source| DispatchMapError::BadLiteral {
                literal: digits.as_str().to_string(),
                root: root_name.to_string(),
                source,
            }),
        None => Ok(None),
    }
}
