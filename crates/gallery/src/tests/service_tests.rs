use shared::domain::{GroupId, GroupKey, GroupLayout, ImageId, LayoutKind};

use super::*;
use crate::{
    lifecycle::UploadFile,
    test_support::{member, solo, MemoryBlobs, MemoryStore, PROJECT},
};

fn three_member_gallery() -> (GroupId, MemoryStore) {
    let grid = GroupId::generate();
    let store = MemoryStore::with_rows(vec![
        solo(1, 0),
        member(2, 1, grid, LayoutKind::Grid3),
        member(3, 2, grid, LayoutKind::Grid3),
        member(4, 3, grid, LayoutKind::Grid3),
        solo(5, 4),
    ]);
    (grid, store)
}

fn upload(kind: LayoutKind, count: usize) -> UploadBatch {
    UploadBatch {
        project_id: PROJECT,
        layout: GroupLayout::with_kind(kind),
        alt_text_primary: Some("studio shot".into()),
        alt_text_secondary: None,
        files: (0..count)
            .map(|i| UploadFile {
                file_name: format!("shot-{i}.jpg"),
                content_type: Some("image/jpeg".into()),
                bytes: vec![i as u8 + 1; 4],
            })
            .collect(),
    }
}

#[tokio::test]
async fn upload_grid_batch_creates_one_group_after_existing_rows() {
    let (_, store) = three_member_gallery();
    let blobs = MemoryBlobs::default();
    let gallery = Gallery::new(store.clone(), blobs.clone());

    let outcome = gallery
        .upload_batch(upload(LayoutKind::Grid2, 2))
        .await
        .expect("upload");
    let group_id = outcome.group_id.expect("group");
    assert_eq!(outcome.image_ids.len(), 2);
    assert_eq!(blobs.objects.lock().await.len(), 2);

    let groups = gallery.groups(PROJECT).await.expect("groups");
    let last = groups.last().expect("last group");
    assert_eq!(last.group_key, GroupKey::Group(group_id));
    assert_eq!(last.order_index, 5);
    assert!(last
        .members
        .iter()
        .all(|m| m.image_url.starts_with("https://media.test/public/project-images/1/")));
}

#[tokio::test]
async fn failed_row_insert_discards_uploaded_media() {
    let store = MemoryStore {
        fail_inserts: true,
        ..MemoryStore::default()
    };
    let blobs = MemoryBlobs::default();
    let gallery = Gallery::new(store, blobs.clone());

    let err = gallery
        .upload_batch(upload(LayoutKind::Grid3, 3))
        .await
        .expect_err("insert fails");
    assert!(matches!(err, GalleryError::Store(_)));
    assert!(blobs.objects.lock().await.is_empty());
    assert_eq!(blobs.removed.lock().await.len(), 3);
}

#[tokio::test]
async fn failed_upload_stops_before_touching_rows() {
    let store = MemoryStore::default();
    let blobs = MemoryBlobs {
        fail_uploads_after: Some(1),
        ..MemoryBlobs::default()
    };
    let gallery = Gallery::new(store.clone(), blobs.clone());

    let err = gallery
        .upload_batch(upload(LayoutKind::Grid2, 2))
        .await
        .expect_err("upload fails");
    assert!(matches!(err, GalleryError::Blob(_)));
    assert!(store.snapshot().await.is_empty());
    assert_eq!(blobs.removed.lock().await.len(), 1);
}

#[tokio::test]
async fn move_group_writes_one_batch_and_renumbers() {
    let (_, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());

    let outcome = gallery
        .move_group(ImageId(1), Direction::Down)
        .await
        .expect("move");
    assert!(outcome.changed());
    assert_eq!(*store.order_batches.lock().await, 1);

    let groups = gallery.groups(PROJECT).await.expect("groups");
    let flattened: Vec<(i64, i64)> = groups
        .iter()
        .flat_map(|g| g.members.iter().map(|m| (m.id.0, m.order_index)))
        .collect();
    assert_eq!(flattened, vec![(2, 0), (3, 1), (4, 2), (1, 3), (5, 4)]);
}

#[tokio::test]
async fn boundary_move_skips_the_store() {
    let (_, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());

    let outcome = gallery
        .move_group(ImageId(5), Direction::Down)
        .await
        .expect("move");
    assert!(!outcome.changed());
    assert_eq!(*store.order_batches.lock().await, 0);
}

#[tokio::test]
async fn moving_a_missing_image_is_not_found() {
    let (_, store) = three_member_gallery();
    let gallery = Gallery::new(store, MemoryBlobs::default());
    let err = gallery
        .move_within_group(ImageId(42), Direction::Up)
        .await
        .expect_err("missing");
    assert!(matches!(err, GalleryError::NotFound(_)));
}

#[tokio::test]
async fn dissolving_one_member_leaves_the_rest_grouped() {
    let (grid, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());

    let change = gallery
        .change_layout_kind(ImageId(3), LayoutKind::Solo)
        .await
        .expect("dissolve");
    assert_eq!(change, LayoutChange::Dissolve);

    let rows = store.snapshot().await;
    let detached = rows.iter().find(|r| r.id == ImageId(3)).expect("row");
    assert_eq!(detached.group_id, None);
    assert_eq!(detached.layout.layout_kind, LayoutKind::Solo);

    let remaining: Vec<_> = rows.iter().filter(|r| r.group_id == Some(grid)).collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining
        .iter()
        .all(|r| r.layout.layout_kind == LayoutKind::Grid3));
}

#[tokio::test]
async fn switching_grid_kind_moves_the_whole_group() {
    let (grid, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());

    gallery
        .change_layout_kind(ImageId(2), LayoutKind::Grid5)
        .await
        .expect("edit");
    let rows = store.snapshot().await;
    assert!(rows
        .iter()
        .filter(|r| r.group_id == Some(grid))
        .all(|r| r.layout.layout_kind == LayoutKind::Grid5));
}

#[tokio::test]
async fn group_layout_edit_applies_to_every_member_but_keeps_alt_text() {
    let (grid, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());
    let layout = GroupLayout {
        layout_kind: LayoutKind::Grid3,
        aspect_ratio: Some("4:5".into()),
        padding: 8,
        ..GroupLayout::default()
    };

    let project = gallery
        .update_group_layout(grid, &layout)
        .await
        .expect("edit");
    assert_eq!(project, PROJECT);

    let rows = store.snapshot().await;
    for row in rows.iter().filter(|r| r.group_id == Some(grid)) {
        assert_eq!(row.layout, layout);
        assert_eq!(row.alt_text_primary, format!("image {}", row.id.0));
    }
}

#[tokio::test]
async fn group_layout_edit_to_solo_is_rejected() {
    let (grid, store) = three_member_gallery();
    let gallery = Gallery::new(store, MemoryBlobs::default());
    let err = gallery
        .update_group_layout(grid, &GroupLayout::default())
        .await
        .expect_err("solo");
    assert!(matches!(err, GalleryError::Validation(_)));
}

#[tokio::test]
async fn dissolve_group_turns_members_solo_in_place() {
    let (grid, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());
    gallery.dissolve_group(grid).await.expect("dissolve");

    let groups = gallery.groups(PROJECT).await.expect("groups");
    assert_eq!(groups.len(), 5);
    assert!(groups.iter().all(|g| g.is_solo()));
}

#[tokio::test]
async fn deleting_a_group_removes_media_then_rows_in_one_call() {
    let (grid, store) = three_member_gallery();
    let blobs = MemoryBlobs::default();
    blobs
        .failing_paths
        .lock()
        .await
        .insert("project-images/1/3.jpg".to_string());
    let gallery = Gallery::new(store.clone(), blobs.clone());

    let outcome = gallery.delete_group(grid).await.expect("delete");
    assert_eq!(outcome.deleted_rows, 3);
    assert_eq!(outcome.media_removed, 2);
    assert_eq!(outcome.media_failed, 1);
    assert_eq!(blobs.removed.lock().await.len(), 3);

    let calls = store.delete_calls.lock().await.clone();
    assert_eq!(calls, vec![vec![ImageId(2), ImageId(3), ImageId(4)]]);
    assert_eq!(store.snapshot().await.len(), 2);
}

#[tokio::test]
async fn deleting_an_unknown_group_is_not_found() {
    let (_, store) = three_member_gallery();
    let gallery = Gallery::new(store, MemoryBlobs::default());
    let err = gallery
        .delete_group(GroupId::generate())
        .await
        .expect_err("missing");
    assert!(matches!(err, GalleryError::NotFound(_)));
}

#[tokio::test]
async fn hidden_rows_are_left_out_of_active_groups() {
    let (_, store) = three_member_gallery();
    let gallery = Gallery::new(store, MemoryBlobs::default());
    gallery
        .update_image(
            ImageId(1),
            &ImagePatch {
                is_active: Some(false),
                ..ImagePatch::default()
            },
        )
        .await
        .expect("hide");

    let groups = gallery.active_groups(PROJECT).await.expect("groups");
    assert_eq!(groups.len(), 2);
    assert!(!groups.iter().any(|g| g.contains(ImageId(1))));
}

#[tokio::test]
async fn blank_alt_text_is_rejected_before_the_store() {
    let (_, store) = three_member_gallery();
    let gallery = Gallery::new(store.clone(), MemoryBlobs::default());
    let err = gallery
        .update_image(
            ImageId(2),
            &ImagePatch {
                alt_text_primary: Some("   ".into()),
                ..ImagePatch::default()
            },
        )
        .await
        .expect_err("blank");
    assert!(matches!(err, GalleryError::Validation(_)));
    let row = store
        .snapshot()
        .await
        .into_iter()
        .find(|r| r.id == ImageId(2))
        .expect("row");
    assert_eq!(row.alt_text_primary, "image 2");
}
