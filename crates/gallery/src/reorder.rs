use shared::{
    domain::{GroupView, ImageId, ImageRecord},
    protocol::Direction,
};

use crate::{grouping::group_images, GalleryError, GalleryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderUpdate {
    pub image_id: ImageId,
    pub order_index: i64,
}

/// Index writes produced by a move. Rows whose index does not change are
/// left out, so an empty plan means the move was a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderPlan {
    pub updates: Vec<OrderUpdate>,
}

impl ReorderPlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Swaps the group holding `anchor` with its neighbour and renumbers every
/// row to `0..N-1` in the new group order.
pub fn plan_group_move(
    images: &[ImageRecord],
    anchor: ImageId,
    direction: Direction,
) -> GalleryResult<ReorderPlan> {
    let mut groups = group_images(images);
    let position = groups
        .iter()
        .position(|group| group.contains(anchor))
        .ok_or_else(|| GalleryError::NotFound(format!("image {anchor}")))?;

    let Some(target) = neighbour(position, groups.len(), direction) else {
        return Ok(ReorderPlan::default());
    };
    groups.swap(position, target);
    Ok(renumber(&groups))
}

/// Moves `image_id` one slot inside its own group. Indices are reassigned
/// from the group's current base, so the group keeps its place among the
/// other groups. Solo rows have nowhere to go.
pub fn plan_member_move(
    images: &[ImageRecord],
    image_id: ImageId,
    direction: Direction,
) -> GalleryResult<ReorderPlan> {
    let groups = group_images(images);
    let group = groups
        .iter()
        .find(|group| group.contains(image_id))
        .ok_or_else(|| GalleryError::NotFound(format!("image {image_id}")))?;
    if group.is_solo() {
        return Ok(ReorderPlan::default());
    }

    let mut members: Vec<&ImageRecord> = group.members.iter().collect();
    let Some(position) = members.iter().position(|member| member.id == image_id) else {
        return Ok(ReorderPlan::default());
    };
    let Some(target) = neighbour(position, members.len(), direction) else {
        return Ok(ReorderPlan::default());
    };
    members.swap(position, target);

    let base = group.order_index;
    let updates = members
        .into_iter()
        .zip(base..)
        .filter(|(member, index)| member.order_index != *index)
        .map(|(member, order_index)| OrderUpdate {
            image_id: member.id,
            order_index,
        })
        .collect();
    Ok(ReorderPlan { updates })
}

fn renumber(groups: &[GroupView]) -> ReorderPlan {
    let updates = groups
        .iter()
        .flat_map(|group| group.members.iter())
        .zip(0_i64..)
        .filter(|(member, index)| member.order_index != *index)
        .map(|(member, order_index)| OrderUpdate {
            image_id: member.id,
            order_index,
        })
        .collect();
    ReorderPlan { updates }
}

fn neighbour(position: usize, len: usize, direction: Direction) -> Option<usize> {
    match direction {
        Direction::Up => position.checked_sub(1),
        Direction::Down => (position + 1 < len).then_some(position + 1),
    }
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
