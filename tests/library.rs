//! Library service tests

mod common;

use common::{chapter_html, two_chapter_book, EpubBuilder};
use reader_server::library::{ARTIFACT_FILE, MAX_SECTION_INDEX};
use reader_server::{Converter, Library, LibraryError};
use tempfile::TempDir;

fn library(books: &TempDir) -> Library {
    Library::with_converter(books.path(), 4, Converter::default())
}

/// Import the fixture book as `fixture_data`
async fn import_fixture(library: &Library, uploads: &TempDir) -> String {
    let source = two_chapter_book().write_to(uploads.path(), "fixture.epub");
    library.import(&source).await.unwrap().id
}

#[tokio::test]
async fn test_import_then_read() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);

    let id = import_fixture(&library, &uploads).await;
    assert_eq!(id, "fixture_data");
    assert!(books.path().join(&id).join(ARTIFACT_FILE).is_file());

    let listing = library.list().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, id);
    assert_eq!(listing[0].title, "Fixture Book");
    assert_eq!(listing[0].author, "Jane Doe");
    assert_eq!(listing[0].chapters, 2);

    let document = library.document(&id).await.unwrap();
    assert_eq!(document.spine.len(), 2);

    let first = library.section(&id, 0).await.unwrap();
    assert_eq!(first.prev, None);
    assert_eq!(first.next, Some(1));
    assert_eq!(first.total, 2);
    assert_eq!(first.section.href, "Text/ch1.xhtml");

    let last = library.section(&id, 1).await.unwrap();
    assert_eq!(last.prev, Some(0));
    assert_eq!(last.next, None);

    let asset = library.asset(&id, "cover_art.png").await.unwrap();
    assert_eq!(asset.content_type, "image/png");
    assert_eq!(asset.bytes, b"\x89PNG fake cover");
}

#[tokio::test]
async fn test_documents_are_cached() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);
    let id = import_fixture(&library, &uploads).await;

    let first = library.document(&id).await.unwrap();
    let second = library.document(&id).await.unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(library.cache().stats().entries, 1);
}

#[tokio::test]
async fn test_reimport_invalidates_cache() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);

    let source = two_chapter_book().title("Before").write_to(uploads.path(), "book.epub");
    let id = library.import(&source).await.unwrap().id;
    assert_eq!(library.document(&id).await.unwrap().metadata.title, "Before");

    let source = two_chapter_book().title("After").write_to(uploads.path(), "book.epub");
    library.import(&source).await.unwrap();
    assert_eq!(library.document(&id).await.unwrap().metadata.title, "After");
}

#[tokio::test]
async fn test_failed_import_reports_conversion_error() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);

    let source = uploads.path().join("junk.epub");
    std::fs::write(&source, b"not a zip").unwrap();

    let err = library.import(&source).await.unwrap_err();
    assert!(matches!(err, LibraryError::Conversion(_)));
    assert!(!books.path().join("junk_data").exists());
}

#[tokio::test]
async fn test_delete_removes_book() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);
    let id = import_fixture(&library, &uploads).await;
    library.document(&id).await.unwrap();

    library.delete(&id).await.unwrap();

    assert!(matches!(library.document(&id).await, Err(LibraryError::NotFound(_))));
    assert!(matches!(library.delete(&id).await, Err(LibraryError::NotFound(_))));
    assert!(library.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejects_invalid_ids() {
    let books = TempDir::new().unwrap();
    let library = library(&books);

    for id in ["../etc_data", "book", "a/b_data", ""] {
        assert!(
            matches!(library.document(id).await, Err(LibraryError::InvalidId(_))),
            "accepted {:?}",
            id
        );
        assert!(matches!(library.delete(id).await, Err(LibraryError::InvalidId(_))));
    }
}

#[tokio::test]
async fn test_missing_book_is_not_found() {
    let books = TempDir::new().unwrap();
    let library = library(&books);

    assert!(matches!(
        library.document("nothing_data").await,
        Err(LibraryError::NotFound(_))
    ));
    // Failed loads are not cached
    assert_eq!(library.cache().stats().entries, 0);
}

#[tokio::test]
async fn test_corrupt_artifact() {
    let books = TempDir::new().unwrap();
    let dir = books.path().join("broken_data");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(ARTIFACT_FILE), b"{ not json").unwrap();
    let library = library(&books);

    assert!(matches!(
        library.document("broken_data").await,
        Err(LibraryError::Corrupt { .. })
    ));
    // Unreadable books are skipped by the listing
    assert!(library.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_section_bounds() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);
    let id = import_fixture(&library, &uploads).await;

    assert!(matches!(
        library.section(&id, MAX_SECTION_INDEX + 1).await,
        Err(LibraryError::InvalidIndex(_))
    ));
    assert!(matches!(
        library.section(&id, 2).await,
        Err(LibraryError::SectionNotFound { index: 2, .. })
    ));
}

#[tokio::test]
async fn test_asset_access_rules() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);
    let id = import_fixture(&library, &uploads).await;
    let images = books.path().join(&id).join("images");

    assert!(matches!(
        library.asset(&id, "..").await,
        Err(LibraryError::InvalidAssetName(_))
    ));
    assert!(matches!(
        library.asset(&id, "").await,
        Err(LibraryError::InvalidAssetName(_))
    ));
    assert!(matches!(
        library.asset(&id, "missing.png").await,
        Err(LibraryError::AssetNotFound(_))
    ));

    // Directory components are dropped, only the basename is looked up
    let asset = library.asset(&id, "../../cover_art.png").await.unwrap();
    assert_eq!(asset.content_type, "image/png");

    std::fs::write(images.join("notes.txt"), b"plain text").unwrap();
    assert!(matches!(
        library.asset(&id, "notes.txt").await,
        Err(LibraryError::Forbidden(_))
    ));

    std::fs::create_dir(images.join("nested.png")).unwrap();
    assert!(matches!(
        library.asset(&id, "nested.png").await,
        Err(LibraryError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_list_sorts_by_title() {
    let books = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();
    let library = library(&books);

    for (file, title) in [("b.epub", "zebra"), ("a.epub", "Apple"), ("c.epub", "mango")] {
        let source = EpubBuilder::new()
            .title(title)
            .chapter("ch1", "ch1.xhtml", &chapter_html(title, "<p>Text</p>"))
            .write_to(uploads.path(), file);
        library.import(&source).await.unwrap();
    }
    std::fs::create_dir(books.path().join("stray_dir")).unwrap();

    let titles: Vec<String> = library
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|book| book.title)
        .collect();
    assert_eq!(titles, vec!["Apple", "mango", "zebra"]);
}

#[tokio::test]
async fn test_health() {
    let books = TempDir::new().unwrap();
    let library = library(&books);

    let health = library.health().await;
    assert!(health.books_dir_accessible);
    assert_eq!(health.cache.capacity, 4);
    assert_eq!(health.cache.entries, 0);

    let gone = Library::with_converter(books.path().join("missing"), 4, Converter::default());
    assert!(!gone.health().await.books_dir_accessible);
}
