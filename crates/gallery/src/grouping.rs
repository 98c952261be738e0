use std::collections::HashMap;

use shared::domain::{GroupKey, GroupView, ImageRecord};

/// Partitions a project's images into display groups.
///
/// Membership decides grouping, not position: rows sharing a `group_id` form
/// one group even when other rows sit between them in index order. Members
/// are ordered by their own index and groups by their lowest member index.
/// Equal indices fall back to image id.
pub fn group_images(images: &[ImageRecord]) -> Vec<GroupView> {
    let mut ordered: Vec<&ImageRecord> = images.iter().collect();
    ordered.sort_by_key(|image| (image.order_index, image.id));

    let mut slots: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<GroupView> = Vec::new();

    for image in ordered {
        let key = match image.group_id {
            Some(group_id) => GroupKey::Group(group_id),
            None => GroupKey::Solo(image.id),
        };
        if let Some(&slot) = slots.get(&key) {
            groups[slot].members.push(image.clone());
            continue;
        }
        slots.insert(key.clone(), groups.len());
        groups.push(GroupView {
            group_key: key,
            order_index: image.order_index,
            members: vec![image.clone()],
        });
    }

    // Rows arrive sorted, so each group's first member already holds its
    // minimum index and `groups` is already in display order.
    groups
}

#[cfg(test)]
#[path = "tests/grouping_tests.rs"]
mod tests;
