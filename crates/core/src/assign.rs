//! Participant partitioning for breakout assignment.
//!
//! Pure: the assignment engine shuffles (or not, per method) before calling
//! [`partition_into_rooms`], so the partition itself is deterministic and
//! directly testable.

use crate::error::CoreError;

/// Partition `participants` into `ceil(len / target_per_room)` groups.
///
/// Guarantees, for any non-empty input and `target_per_room >= 1`:
/// - every participant lands in exactly one group,
/// - no group is empty,
/// - group sizes differ by at most one (larger groups first),
/// - no group exceeds `target_per_room`,
/// - input order is preserved within and across groups.
///
/// An empty input produces no groups. `target_per_room == 0` is a
/// validation error.
pub fn partition_into_rooms<T: Clone>(
    participants: &[T],
    target_per_room: u32,
) -> Result<Vec<Vec<T>>, CoreError> {
    if target_per_room == 0 {
        return Err(CoreError::Validation(
            "target participants per room must be at least 1".to_string(),
        ));
    }
    if participants.is_empty() {
        return Ok(Vec::new());
    }

    let total = participants.len();
    let target = target_per_room as usize;
    let room_count = total.div_ceil(target);
    let base = total / room_count;
    let remainder = total % room_count;

    let mut rooms = Vec::with_capacity(room_count);
    let mut cursor = 0;
    for index in 0..room_count {
        // The first `remainder` rooms take one extra participant.
        let size = if index < remainder { base + 1 } else { base };
        rooms.push(participants[cursor..cursor + size].to_vec());
        cursor += size;
    }

    Ok(rooms)
}
