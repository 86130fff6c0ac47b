use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::correlate::{MatchTriple, OpcodeEntry};

fn function_name<'a>(entry: &'a OpcodeEntry<'_>) -> &'a str {
    entry
        .function
        .map(|f| f.short_name.as_str())
        .unwrap_or("<unknown>")
}

fn delta(triple: &MatchTriple<'_>) -> (char, i64) {
    let diff = triple.new.opcode as i64 - triple.old.opcode as i64;
    (if diff >= 0 { '+' } else { '-' }, diff.abs())
}

/// Multi-line record per match: opcodes, signed delta, truncated certainty,
/// and both function names.
pub fn write_detailed<W: Write>(out: &mut W, triples: &[MatchTriple<'_>]) -> io::Result<()> {
    for triple in triples {
        let (sign, diff) = delta(triple);
        writeln!(
            out,
            "Opcode pair ({} -> {})[{sign}{diff}] with certainty {}%",
            triple.old.opcode, triple.new.opcode, triple.score as i64
        )?;
        writeln!(
            out,
            "Old function: {}, new function {}",
            function_name(&triple.old),
            function_name(&triple.new)
        )?;
        writeln!(out)?;
    }
    Ok(())
}

/// One line per match: `old -> new [±delta] (certainty%)`.
pub fn write_simple<W: Write>(out: &mut W, triples: &[MatchTriple<'_>]) -> io::Result<()> {
    for triple in triples {
        let (sign, diff) = delta(triple);
        writeln!(
            out,
            "{} -> {} [{sign}{diff}] ({}%)",
            triple.old.opcode, triple.new.opcode, triple.score as i64
        )?;
    }
    Ok(())
}

/// Renders both report files for one mode, `<prefix>_detailed.log` and
/// `<prefix>_simple.log`, into `out_dir`.
pub fn write_reports(out_dir: &Path, prefix: &str, triples: &[MatchTriple<'_>]) -> io::Result<()> {
    let mut detailed = BufWriter::new(File::create(
        out_dir.join(format!("{prefix}_detailed.log")),
    )?);
    write_detailed(&mut detailed, triples)?;
    detailed.flush()?;

    let mut simple = BufWriter::new(File::create(out_dir.join(format!("{prefix}_simple.log")))?);
    write_simple(&mut simple, triples)?;
    simple.flush()?;

    Ok(())
}
