//! Tests for the MongoDB connector that need no running server.

use super::*;

fn endpoint(uri: &str) -> EndpointConfig {
    EndpointConfig {
        uri: uri.to_string(),
        database: "app".to_string(),
    }
}

#[test]
fn test_mongodb_connector_types() {
    let connector = MongoConnector::new(endpoint("mongodb://localhost"), Side::Source);
    assert_eq!(DocumentSource::source_type(&connector), "mongodb");
    assert_eq!(DocumentSink::sink_type(&connector), "mongodb");
}

#[tokio::test]
async fn test_unconnected_source_reports_source_error() {
    let connector = MongoConnector::new(endpoint("mongodb://localhost"), Side::Source);
    let err = DocumentSource::count_documents(&connector, "accounts")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceConnection(_)));
}

#[tokio::test]
async fn test_unconnected_sink_reports_destination_error() {
    let connector = MongoConnector::new(endpoint("mongodb://localhost"), Side::Destination);
    let err = DocumentSink::drop_collection(&connector, "accounts")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DestinationConnection(_)));
}

#[tokio::test]
async fn test_invalid_uri_fails_to_connect() {
    let mut connector = MongoConnector::new(endpoint("not-a-mongodb-uri"), Side::Destination);
    let err = DocumentSink::connect(&mut connector).await.unwrap_err();
    assert!(matches!(err, Error::DestinationConnection(_)));
    assert!(err.to_string().contains("app"));
}

#[tokio::test]
async fn test_empty_insert_skips_driver() {
    // No connection needed: empty batches never reach the server.
    let connector = MongoConnector::new(endpoint("mongodb://localhost"), Side::Destination);
    let inserted = DocumentSink::insert_many(&connector, "accounts", vec![])
        .await
        .unwrap();
    assert_eq!(inserted, 0);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let mut connector = MongoConnector::new(endpoint("mongodb://localhost"), Side::Source);
    DocumentSource::close(&mut connector).await.unwrap();
    DocumentSource::close(&mut connector).await.unwrap();
}
