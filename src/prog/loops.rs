//! Large-loop decomposition.
//!
//! A repeated-send loop is driven by one engine loop variable, and the engine
//! bounds the *byte count* such a variable may cover. "Elephant" programs
//! (tens of thousands of chunks) therefore split into an outer loop of inner
//! batches plus a residue loop, all within the byte ceiling.

use super::builder::ProgramBuilder;
use super::error::ProgramError;
use tracing::debug;

/// Default byte ceiling for one loop variable: a quarter of the unsigned
/// 32-bit range. An engine parameter, not a universal constant.
pub const DEFAULT_LOOP_BYTE_CEILING: u64 = (u32::MAX as u64) / 4;

/// Decomposition of `loop_count` sends of `chunk_bytes` each.
///
/// `outer_loops == 0` means "no decomposition needed": `inner_bytes` then
/// holds the flat total and `residue_chunks` is zero. Otherwise the exact
/// identity `inner_bytes * outer_loops + chunk_bytes * residue_chunks ==
/// chunk_bytes * loop_count` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSplit {
    /// Payload bytes of one inner batch (or the flat total).
    pub inner_bytes: u64,
    /// Outer iterations; zero selects the flat single-loop form.
    pub outer_loops: u64,
    /// Leftover chunks sent after the nested loops.
    pub residue_chunks: u64,
}

/// Split `loop_count` chunks of `chunk_bytes` under `byte_ceiling`.
pub fn split_chunk_loop(
    chunk_bytes: u64,
    loop_count: u64,
    byte_ceiling: u64,
) -> Result<LoopSplit, ProgramError> {
    if chunk_bytes == 0 || loop_count == 0 {
        return Err(ProgramError::BadLoopSplit);
    }
    let total = chunk_bytes
        .checked_mul(loop_count)
        .ok_or(ProgramError::BadLoopSplit)?;

    // Largest number of chunks one inner batch may cover. A chunk larger than
    // the ceiling cannot be subdivided; it batches one at a time.
    let max_mul = (byte_ceiling / chunk_bytes).max(1);
    let outer = loop_count / max_mul;
    if outer < 1 {
        return Ok(LoopSplit {
            inner_bytes: total,
            outer_loops: 0,
            residue_chunks: 0,
        });
    }

    let residue = loop_count - outer * max_mul;
    let split = LoopSplit {
        inner_bytes: chunk_bytes * max_mul,
        outer_loops: outer,
        residue_chunks: residue,
    };
    // A mismatch is a defect in this function, never a runtime condition.
    assert_eq!(
        split.inner_bytes * split.outer_loops + chunk_bytes * split.residue_chunks,
        total,
        "loop split must cover the requested bytes exactly"
    );
    debug!(chunk_bytes, loop_count, max_mul, ?split, "拆分大循环");
    Ok(split)
}

/// Author a chunked send loop on `builder`: `loop_count` sends of `chunk`,
/// decomposed under `byte_ceiling` so no loop variable exceeds the engine
/// bound. Generated labels/variables derive from the current instruction
/// index and cannot collide across calls.
pub fn emit_chunk_loop(
    builder: &mut ProgramBuilder,
    chunk: &[u8],
    loop_count: u64,
    byte_ceiling: u64,
) -> Result<(), ProgramError> {
    if chunk.is_empty() {
        return Err(ProgramError::EmptyBuffer);
    }
    let chunk_bytes = chunk.len() as u64;
    let split = split_chunk_loop(chunk_bytes, loop_count, byte_ceiling)?;
    let tag = builder.len();

    if split.outer_loops == 0 {
        if loop_count == 1 {
            return builder.send(chunk);
        }
        let var = format!("chunk{tag}");
        let label = format!("chunk{tag}:");
        builder.set_var(&var, loop_count)?;
        builder.set_label(&label)?;
        builder.send(chunk)?;
        builder.jmp_nz(&var, &label)?;
        return Ok(());
    }

    let inner_chunks = split.inner_bytes / chunk_bytes;
    let outer_var = format!("chunk{tag}_outer");
    let outer_label = format!("chunk{tag}_outer:");
    let inner_var = format!("chunk{tag}_inner");
    let inner_label = format!("chunk{tag}_inner:");
    builder.set_var(&outer_var, split.outer_loops)?;
    builder.set_label(&outer_label)?;
    builder.set_var(&inner_var, inner_chunks)?;
    builder.set_label(&inner_label)?;
    builder.send(chunk)?;
    builder.jmp_nz(&inner_var, &inner_label)?;
    builder.jmp_nz(&outer_var, &outer_label)?;

    if split.residue_chunks > 0 {
        let res_var = format!("chunk{tag}_res");
        let res_label = format!("chunk{tag}_res:");
        builder.set_var(&res_var, split.residue_chunks)?;
        builder.set_label(&res_label)?;
        builder.send(chunk)?;
        builder.jmp_nz(&res_var, &res_label)?;
    }
    Ok(())
}
