//! Room construction for one assignment round.

use plenum_core::assign::partition_into_rooms;
use plenum_core::error::CoreError;
use plenum_core::meeting::Presence;
use plenum_core::room::{BreakoutRoom, RoomFlag};
use plenum_core::session::AssignmentMethod;
use plenum_core::types::{ParticipantId, RoomId};
use rand::seq::SliceRandom;

/// Order eligible participants for partitioning.
///
/// `presences` arrive sorted by join time, which is exactly the join-order
/// assignment; random assignment shuffles before partitioning so room
/// composition varies between rounds.
fn order_for_assignment(method: AssignmentMethod, presences: &[Presence]) -> Vec<ParticipantId> {
    let mut ids: Vec<ParticipantId> = presences.iter().map(|p| p.participant_id).collect();
    if method == AssignmentMethod::Random {
        ids.shuffle(&mut rand::rng());
    }
    ids
}

/// Turn eligible participants into room documents: order, partition into
/// groups of at most `target_per_room` with no empty rooms, and name the
/// rooms "Room 1", "Room 2", ... in partition order.
pub fn assign_rooms(
    method: AssignmentMethod,
    target_per_room: u32,
    presences: &[Presence],
    record: bool,
) -> Result<Vec<BreakoutRoom>, CoreError> {
    let ordered = order_for_assignment(method, presences);
    let groups = partition_into_rooms(&ordered, target_per_room)?;
    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(index, participants)| BreakoutRoom {
            id: RoomId::new(),
            name: format!("Room {}", index + 1),
            participants,
            flag: RoomFlag::Unflagged,
            help_requested_at: None,
            record,
        })
        .collect())
}
