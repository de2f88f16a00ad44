//! Tests for the in-memory connector.

use super::*;
use bson::doc;

fn numbered(count: i32) -> Vec<Document> {
    (0..count).map(|n| doc! { "_id": n, "n": n }).collect()
}

#[tokio::test]
async fn test_memory_fetch_page_bounds() {
    let db = MemoryDatabase::new().with_collection("items", numbered(5));

    let first = db.fetch_page("items", 0, 2).await.unwrap();
    let last = db.fetch_page("items", 4, 2).await.unwrap();
    let past = db.fetch_page("items", 10, 2).await.unwrap();

    assert_eq!(first, numbered(2));
    assert_eq!(last, vec![doc! { "_id": 4, "n": 4 }]);
    assert!(past.is_empty());
    assert!(db.fetch_page("missing", 0, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_count_and_list() {
    let db = MemoryDatabase::new()
        .with_collection("b", numbered(3))
        .with_collection("a", vec![]);

    assert_eq!(DocumentSource::list_collections(&db).await.unwrap(), vec!["a", "b"]);
    assert_eq!(db.count_documents("b").await.unwrap(), 3);
    assert_eq!(db.count_documents("nope").await.unwrap(), 0);
}

#[tokio::test]
async fn test_memory_insert_creates_collection() {
    let db = MemoryDatabase::new();
    let inserted = db.insert_many("fresh", numbered(3)).await.unwrap();

    assert_eq!(inserted, 3);
    assert_eq!(db.collection("fresh").unwrap().len(), 3);
    assert_eq!(db.write_count(), 1);
}

#[tokio::test]
async fn test_memory_insert_reports_duplicates_after_inserting_rest() {
    let db = MemoryDatabase::new().with_collection("items", numbered(1));

    let err = db.insert_many("items", numbered(3)).await.unwrap_err();

    assert!(matches!(err, Error::Insert { .. }));
    assert_eq!(db.collection("items").unwrap().len(), 3);
}

#[tokio::test]
async fn test_memory_drop_records_request() {
    let db = MemoryDatabase::new().with_collection("items", numbered(1));

    db.drop_collection("items").await.unwrap();
    db.drop_collection("items").await.unwrap();

    assert!(db.collection("items").is_none());
    assert_eq!(db.dropped(), vec!["items", "items"]);
}

#[tokio::test]
async fn test_memory_find_one_matches_all_fields() {
    let db = MemoryDatabase::new().with_collection(
        "users",
        vec![
            doc! { "email": "a@x.io", "role": "user" },
            doc! { "email": "a@x.io", "role": "admin" },
        ],
    );

    let found = db
        .find_one("users", doc! { "email": "a@x.io", "role": "admin" })
        .await
        .unwrap();
    assert_eq!(found.unwrap().get_str("role").unwrap(), "admin");

    let missing = db.find_one("users", doc! { "email": "b@x.io" }).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_memory_injected_failures() {
    let mut db = MemoryDatabase::new().with_collection("items", numbered(1));
    db.fail_queries_on("items");
    db.fail_inserts_into("other");

    assert!(matches!(
        db.count_documents("items").await,
        Err(Error::Query { .. })
    ));
    assert!(matches!(
        db.insert_many("other", numbered(1)).await,
        Err(Error::Insert { .. })
    ));

    db.refuse_connections();
    assert!(matches!(
        DocumentSource::connect(&mut db).await,
        Err(Error::SourceConnection(_))
    ));
    assert!(matches!(
        DocumentSink::connect(&mut db).await,
        Err(Error::DestinationConnection(_))
    ));
}

#[tokio::test]
async fn test_memory_clones_share_state() {
    let db = MemoryDatabase::new();
    let handle = db.clone();

    db.insert_many("items", numbered(2)).await.unwrap();

    assert_eq!(handle.collection("items").unwrap().len(), 2);
}
