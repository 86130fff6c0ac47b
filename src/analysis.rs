use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::clean::clean;
use crate::correlate::{correlate, MatchTriple, OpcodeEntry};
use crate::direct::CallPattern;
use crate::dispatch::{find_root, map_dispatch, DispatchRoots};
use crate::extract::FunctionRecord;
use crate::report::write_reports;

/// Per-mode tuning knobs, overridable from the command line.
#[derive(Debug, Clone, Copy)]
pub struct ModeParams {
    pub variance_percent: u32,
    pub threshold_percent: u32,
}

impl ModeParams {
    pub const DIRECT: ModeParams = ModeParams {
        variance_percent: 15,
        threshold_percent: 30,
    };
    pub const DISPATCH: ModeParams = ModeParams {
        variance_percent: 25,
        threshold_percent: 40,
    };

    pub fn with_overrides(self, variance: Option<u32>, threshold: Option<u32>) -> ModeParams {
        ModeParams {
            variance_percent: variance.unwrap_or(self.variance_percent),
            threshold_percent: threshold.unwrap_or(self.threshold_percent),
        }
    }
}

// Drops functions without a packet-construction call and cuts long bodies
// down to the window around the call. Works on copies; the raw records stay
// intact for other modes.
fn prepare_direct(records: &[FunctionRecord], pattern: &CallPattern) -> Vec<FunctionRecord> {
    records
        .iter()
        .filter(|r| pattern.keep(r))
        .map(|r| pattern.trim(r))
        .collect()
}

/// Direct mode (recvops): every kept function is scanned for
/// packet-construction calls and the discovered opcodes are correlated
/// across versions. Reports land in `out_dir` as `recv_*.log`.
pub fn run_direct(
    old_records: &[FunctionRecord],
    new_records: &[FunctionRecord],
    pattern: &CallPattern,
    params: ModeParams,
    out_dir: &Path,
) -> Result<usize> {
    let old_kept = prepare_direct(old_records, pattern);
    let new_kept = prepare_direct(new_records, pattern);
    info!(
        old_removed = old_records.len() - old_kept.len(),
        new_removed = new_records.len() - new_kept.len(),
        "removed extraneous functions"
    );

    let mut old_entries = Vec::new();
    for record in &old_kept {
        old_entries.extend(pattern.map_direct(record)?);
    }
    let mut new_entries = Vec::new();
    for record in &new_kept {
        new_entries.extend(pattern.map_direct(record)?);
    }
    info!(
        old = old_entries.len(),
        new = new_entries.len(),
        "mapped opcodes, evaluating certainty"
    );

    let cleaned = correlate_and_clean(&old_entries, &new_entries, params);
    write_reports(out_dir, "recv", &cleaned).context("writing recv reports")?;
    Ok(cleaned.len())
}

/// Dispatch mode (sendops): each configured root's branch table is walked on
/// both sides and the per-arm opcodes are correlated. Reports land in
/// `out_dir` as `send_*.log`.
pub fn run_dispatch(
    old_records: &[FunctionRecord],
    new_records: &[FunctionRecord],
    params: ModeParams,
    roots: &DispatchRoots,
    out_dir: &Path,
) -> Result<usize> {
    let mut old_entries = Vec::new();
    let mut new_entries = Vec::new();

    for root_name in roots.iter() {
        let (Some(old_root), Some(new_root)) = (
            find_root(old_records, root_name),
            find_root(new_records, root_name),
        ) else {
            warn!(root = root_name, "root function not found in decompiled code, skipping");
            continue;
        };

        info!(root = root_name, "creating opcode map");
        old_entries.extend(map_dispatch(old_root, old_records)?);
        new_entries.extend(map_dispatch(new_root, new_records)?);
    }
    info!(
        old = old_entries.len(),
        new = new_entries.len(),
        "mapped opcodes, evaluating certainty"
    );

    let cleaned = correlate_and_clean(&old_entries, &new_entries, params);
    write_reports(out_dir, "send", &cleaned).context("writing send reports")?;
    Ok(cleaned.len())
}

fn correlate_and_clean<'a>(
    old_entries: &[OpcodeEntry<'a>],
    new_entries: &[OpcodeEntry<'a>],
    params: ModeParams,
) -> Vec<MatchTriple<'a>> {
    let paired = correlate(old_entries, new_entries, params.variance_percent);
    clean(paired, params.threshold_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    const OLD_DUMP: &str = "\
int __thiscall CUser__OnChat(int this, int a2)
{
  v1 = 2;
  COutPacket__COutPacket_0(v1, 10);
}
";

    // Same handler one inserted character later, renumbered 10 -> 12.
    const NEW_DUMP: &str = "\
int __thiscall CUser__OnChat(int this, int a2)
{
  v1 = 22;
  COutPacket__COutPacket_0(v1, 12);
}
";

    #[test]
    fn direct_pipeline_matches_renumbered_handler() {
        let old_records = extract(OLD_DUMP).unwrap();
        let new_records = extract(NEW_DUMP).unwrap();

        let pattern = CallPattern::default();
        let old_kept = prepare_direct(&old_records, &pattern);
        let new_kept = prepare_direct(&new_records, &pattern);

        let old_entries = pattern.map_direct(&old_kept[0]).unwrap();
        let new_entries = pattern.map_direct(&new_kept[0]).unwrap();

        let params = ModeParams::DIRECT.with_overrides(Some(20), Some(30));
        let cleaned = correlate_and_clean(&old_entries, &new_entries, params);

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].old.opcode, 10);
        assert_eq!(cleaned[0].new.opcode, 12);
        assert!(cleaned[0].score > 90.0);
    }

    #[test]
    fn run_direct_writes_both_reports() {
        let old_records = extract(OLD_DUMP).unwrap();
        let new_records = extract(NEW_DUMP).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let params = ModeParams::DIRECT.with_overrides(Some(20), Some(30));
        let pattern = CallPattern::default();
        let matched =
            run_direct(&old_records, &new_records, &pattern, params, dir.path()).unwrap();
        assert_eq!(matched, 1);

        let simple = std::fs::read_to_string(dir.path().join("recv_simple.log")).unwrap();
        assert!(simple.starts_with("10 -> 12 [+2] ("));

        let detailed = std::fs::read_to_string(dir.path().join("recv_detailed.log")).unwrap();
        assert!(detailed.contains("Opcode pair (10 -> 12)[+2]"));
        assert!(detailed.contains("Old function: CUser__OnChat, new function CUser__OnChat"));
    }

    #[test]
    fn run_dispatch_correlates_root_branches() {
        let old_dump = "\
void __thiscall CUser__OnHit(int this)
{
  v1 = this;
  v2 = 100;
  v3 = v1 + v2;
  CUser__SetDamage(v1, v3);
}
int __thiscall CWvsContext__OnPacket(int this, int a2)
{
  if ( a2 == 1000 )
    CUser__OnHit(this);
}
";
        let new_dump = "\
void __thiscall CUser__OnHit(int this)
{
  v1 = this;
  v2 = 105;
  v3 = v1 + v2;
  CUser__SetDamage(v1, v3);
}
int __thiscall CWvsContext__OnPacket(int this, int a2)
{
  if ( a2 == 1010 )
    CUser__OnHit(this);
}
";
        let old_records = extract(old_dump).unwrap();
        let new_records = extract(new_dump).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let matched = run_dispatch(
            &old_records,
            &new_records,
            ModeParams::DISPATCH,
            &DispatchRoots::default(),
            dir.path(),
        )
        .unwrap();
        assert_eq!(matched, 1);

        let simple = std::fs::read_to_string(dir.path().join("send_simple.log")).unwrap();
        assert!(simple.starts_with("1000 -> 1010 [+10] ("));
    }

    #[test]
    fn missing_roots_produce_empty_reports_not_errors() {
        let old_records = extract(OLD_DUMP).unwrap();
        let new_records = extract(NEW_DUMP).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let matched = run_dispatch(
            &old_records,
            &new_records,
            ModeParams::DISPATCH,
            &DispatchRoots::default(),
            dir.path(),
        )
        .unwrap();
        assert_eq!(matched, 0);
        assert!(dir.path().join("send_simple.log").exists());
    }
}
