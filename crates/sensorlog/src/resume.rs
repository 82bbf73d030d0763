//! Reconciles the Day partition cursor with the caller's wall-clock time.

use crate::codec::SampleInterval;
use crate::error::Result;
use crate::partition::PartitionFile;
use chrono::Timelike;
use tracing::debug;

/// Result of reconciling a Day partition with the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The cursor already matched the expected slot.
    UpToDate,
    /// Absent records were written to close a gap.
    Filled {
        /// First slot that was filled.
        from: usize,
        /// Number of absent records written.
        count: usize,
    },
    /// The file was ahead of the clock and the cursor moved back.
    Repositioned {
        /// Cursor before the move.
        from: usize,
        /// Cursor after the move.
        to: usize,
    },
}

/// Day slot covering `time` for the given cadence.
pub fn expected_slot(interval: SampleInterval, time: impl Timelike) -> usize {
    ((time.hour() * 60 + time.minute()) / interval.minutes()) as usize
}

/// Reconciles a freshly opened Day partition with the expected slot.
///
/// Every slot up to and including `expected` exists afterwards, either with
/// data or marked absent. A file that is ahead of `expected` keeps its
/// records and only has its cursor moved back.
pub fn resume(day: &mut PartitionFile, expected: usize) -> Result<ResumeOutcome> {
    day.truncate_to_last_complete_record()?;
    let cursor = day.current_slot()?;
    day.set_cursor(cursor)?;

    if expected < cursor {
        day.set_cursor(expected)?;
        debug!(
            "Repositioned {} cursor from {} to {}",
            day.path().display(),
            cursor,
            expected
        );
        return Ok(ResumeOutcome::Repositioned {
            from: cursor,
            to: expected,
        });
    }

    let count = day.fill_absent(expected + 1)?;
    if count == 0 {
        return Ok(ResumeOutcome::UpToDate);
    }
    debug!(
        "Filled {} absent records in {} from slot {}",
        count,
        day.path().display(),
        cursor
    );
    Ok(ResumeOutcome::Filled {
        from: cursor,
        count,
    })
}

/// Moves the cursor to `slot` before a write, filling any gap since the last
/// record with absent entries.
pub fn advance(day: &mut PartitionFile, slot: usize) -> Result<ResumeOutcome> {
    let cursor = day.cursor();
    let end = day.current_slot()?;
    let count = day.position_at(slot)?;

    if count > 0 {
        debug!(
            "Filled {} absent records in {} from slot {}",
            count,
            day.path().display(),
            end
        );
        Ok(ResumeOutcome::Filled { from: end, count })
    } else if slot < cursor {
        Ok(ResumeOutcome::Repositioned {
            from: cursor,
            to: slot,
        })
    } else {
        Ok(ResumeOutcome::UpToDate)
    }
}
