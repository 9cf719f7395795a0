use crate::cache::{ArtifactKind, naming};
use crate::test_support::{self, TestLibrary};

#[tokio::test]
async fn test_cleanup_removes_only_orphans() {
    let lib = TestLibrary::new();
    lib.write_image("album/keep.png", &test_support::solid_image(40, 40, [1, 2, 3]));
    let cache = lib.library.cache();
    cache.generate_thumbnail("album/keep.png").await.unwrap();
    std::fs::write(lib.cache_path("album/orphan.thumb.jpg"), b"stale").unwrap();

    let entries = lib.library.list_directory("album").await.unwrap();
    let removed = cache.cleanup_cache("album", &entries).await;

    assert_eq!(removed, 1);
    assert!(lib.cache_path("album/keep.thumb.jpg").exists());
    assert!(!lib.cache_path("album/orphan.thumb.jpg").exists());
}

#[tokio::test]
async fn test_cleanup_keeps_markers_and_folders() {
    let lib = TestLibrary::new();
    lib.write_media("a.jpg", b"x");
    std::fs::create_dir_all(lib.media_path("sub")).unwrap();

    std::fs::create_dir_all(lib.cache_path("sub")).unwrap();
    std::fs::create_dir_all(lib.cache_path("removed_album")).unwrap();
    std::fs::write(lib.cache_path("removed_album/x.thumb.jpg"), b"x").unwrap();
    std::fs::write(lib.cache_path("a.thumb.err.txt"), b"broken").unwrap();
    std::fs::write(lib.cache_path("a.preview.err.txt"), b"broken").unwrap();

    let entries = lib.library.list_directory("").await.unwrap();
    let removed = lib.library.cache().cleanup_cache("", &entries).await;

    assert_eq!(removed, 1);
    assert!(lib.cache_path("sub").exists());
    assert!(lib.cache_path("a.thumb.err.txt").exists());
    assert!(lib.cache_path("a.preview.err.txt").exists());
    assert!(!lib.cache_path("removed_album").exists());
}

#[tokio::test]
async fn test_cleanup_keeps_current_collage_only() {
    let lib = TestLibrary::new();
    lib.write_image("album/a.png", &test_support::solid_image(40, 40, [1, 2, 3]));
    lib.write_image("album/b.png", &test_support::solid_image(40, 40, [3, 2, 1]));

    let current = lib.library.generate_album_thumbnail("album").await.unwrap();
    let stale_key = naming::album_thumbnail_key("album", &["a.png"]);
    std::fs::write(lib.cache_path(&stale_key), b"old collage").unwrap();

    let entries = lib.library.list_directory("album").await.unwrap();
    let removed = lib.library.cache().cleanup_cache("album", &entries).await;

    assert_eq!(removed, 1);
    assert!(current.exists());
    assert!(!lib.cache_path(&stale_key).exists());
}

#[tokio::test]
async fn test_remove_artifacts_clears_files_markers_and_records() {
    let lib = TestLibrary::new();
    lib.write_image("x/big.png", &test_support::solid_image(1500, 1500, [1, 2, 3]));
    let cache = lib.library.cache();
    cache.generate_thumbnail("x/big.png").await.unwrap();
    cache.generate_preview("x/big.png").await.unwrap();
    std::fs::write(lib.cache_path("x/big.thumb.err.txt"), b"old failure").unwrap();

    let removed = cache.remove_artifacts("x/big.png").await.unwrap();

    assert_eq!(removed, 3);
    assert!(!lib.cache_path("x/big.thumb.jpg").exists());
    assert!(!lib.cache_path("x/big.preview.jpg").exists());
    assert!(!lib.cache_path("x/big.thumb.err.txt").exists());
    assert!(!cache.has_thumbnail("x/big.png").await);
    assert!(!cache.has_preview("x/big.png").await);

    // Nothing left to remove the second time
    assert_eq!(cache.remove_artifacts("x/big.png").await.unwrap(), 0);
}

#[tokio::test]
async fn test_remove_directory_purges_subtree() {
    let lib = TestLibrary::new();
    lib.write_image("trip/day1/a.png", &test_support::solid_image(40, 40, [1, 2, 3]));
    lib.write_image("tripod.png", &test_support::solid_image(40, 40, [1, 2, 3]));
    let cache = lib.library.cache();
    cache.generate_thumbnail("trip/day1/a.png").await.unwrap();
    cache.generate_thumbnail("tripod.png").await.unwrap();

    assert!(cache.remove_directory("trip").await.unwrap());

    assert!(!lib.cache_path("trip").exists());
    assert!(!cache.records().contains(ArtifactKind::Thumbnail, "trip/day1/a.thumb.jpg").await);
    assert!(cache.records().contains(ArtifactKind::Thumbnail, "tripod.thumb.jpg").await);
    assert!(!cache.remove_directory("trip").await.unwrap());
    assert!(cache.remove_directory("").await.is_err());
}

#[tokio::test]
async fn test_cleanup_leaves_in_flight_scratch_files() {
    let lib = TestLibrary::new();
    lib.write_media("a.jpg", b"x");
    lib.write_media("clip.mp4", b"x");
    std::fs::create_dir_all(lib.cache_path("")).unwrap();
    std::fs::write(lib.cache_path("a.thumb.jpg.part"), b"half").unwrap();
    std::fs::write(lib.cache_path("clip.thumb.jpg.sh.jpg"), b"frame").unwrap();
    std::fs::write(lib.cache_path("stale.jpg.txt"), b"x").unwrap();

    let entries = lib.library.list_directory("").await.unwrap();
    let removed = lib.library.cache().cleanup_cache("", &entries).await;

    assert_eq!(removed, 1);
    assert!(lib.cache_path("a.thumb.jpg.part").exists());
    assert!(lib.cache_path("clip.thumb.jpg.sh.jpg").exists());
    assert!(!lib.cache_path("stale.jpg.txt").exists());
}
