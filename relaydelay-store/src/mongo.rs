use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use relaydelay_common::UnixMillis;
use relaydelay_config::Config;

use crate::{StoreError, TelemetryRecord, TelemetryStore, TimeRange};

/// Name reported to the MongoDB server for connections of this client.
const APP_NAME: &str = "relaydelay";

/// A [`TelemetryStore`] backed by a MongoDB collection.
///
/// Every document holds the encoded blob in `blob_field` and its insertion time in epoch
/// milliseconds in `time_field`.
#[derive(Clone, Debug)]
pub struct MongoStore {
    collection: Collection<Document>,
    blob_field: String,
    time_field: String,
}

impl MongoStore {
    /// Creates a store from the `store` section of the configuration.
    ///
    /// The driver connects lazily, so an unreachable server only surfaces on the first query.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(config.store_url())
            .await
            .map_err(StoreError::Connect)?;

        options.app_name = Some(APP_NAME.to_owned());
        options.connect_timeout = Some(config.store_connect_timeout());
        options.server_selection_timeout = Some(config.store_connect_timeout());

        let client = Client::with_options(options).map_err(StoreError::Connect)?;
        let collection = client
            .database(config.store_database())
            .collection(config.store_collection());

        relaydelay_log::debug!(
            database = config.store_database(),
            collection = config.store_collection(),
            "configured telemetry store"
        );

        Ok(Self {
            collection,
            blob_field: config.store_blob_field().to_owned(),
            time_field: config.store_time_field().to_owned(),
        })
    }

    /// Builds the filter selecting documents with a numeric insertion time.
    ///
    /// Range queries compare against millisecond numbers, so documents with other time types are
    /// never fetched and must not move the upper bound either.
    fn latest_filter(&self) -> Document {
        let mut filter = Document::new();
        filter.insert(self.time_field.as_str(), doc! { "$type": "number" });
        filter
    }

    /// Builds the filter selecting non-empty blobs within `range`.
    fn range_filter(&self, range: TimeRange) -> Document {
        let mut filter = Document::new();
        filter.insert(
            self.time_field.as_str(),
            doc! { "$gt": range.after.as_millis(), "$lt": range.before.as_millis() },
        );
        filter.insert(
            self.blob_field.as_str(),
            doc! { "$exists": true, "$nin": ["", Bson::Null] },
        );
        filter
    }

    fn projection(&self, fields: &[&str]) -> Document {
        let mut projection = doc! { "_id": 0 };
        for &field in fields {
            projection.insert(field, 1);
        }
        projection
    }

    /// Converts a fetched document into a record, skipping documents without a usable blob.
    fn record_from_document(&self, document: &Document) -> Option<TelemetryRecord> {
        let blob = match document.get(&self.blob_field) {
            Some(Bson::String(blob)) if !blob.is_empty() => blob.clone(),
            Some(Bson::String(_)) | None => return None,
            Some(other) => {
                relaydelay_log::debug!(
                    element_type = ?other.element_type(),
                    "skipping telemetry record with non-string blob"
                );
                return None;
            }
        };

        let inserted_at = document.get(&self.time_field).and_then(bson_millis)?;

        Some(TelemetryRecord {
            blob,
            inserted_at,
        })
    }
}

/// Reads an insertion time stored as a number of milliseconds.
fn bson_millis(value: &Bson) -> Option<UnixMillis> {
    let millis = match value {
        Bson::Int64(millis) => *millis,
        Bson::Int32(millis) => i64::from(*millis),
        Bson::Double(millis) if millis.is_finite() => *millis as i64,
        _ => return None,
    };

    Some(UnixMillis::from_millis(millis))
}

#[async_trait::async_trait]
impl TelemetryStore for MongoStore {
    async fn latest_insert_time(&self) -> Result<Option<UnixMillis>, StoreError> {
        let mut sort = Document::new();
        sort.insert(self.time_field.as_str(), -1);

        let latest = self
            .collection
            .find_one(self.latest_filter())
            .sort(sort)
            .projection(self.projection(&[self.time_field.as_str()]))
            .await
            .map_err(StoreError::Query)?;

        Ok(latest.and_then(|document| document.get(&self.time_field).and_then(bson_millis)))
    }

    async fn find_blobs(&self, range: TimeRange) -> Result<Vec<TelemetryRecord>, StoreError> {
        let mut cursor = self
            .collection
            .find(self.range_filter(range))
            .projection(self.projection(&[self.blob_field.as_str(), self.time_field.as_str()]))
            .await
            .map_err(StoreError::Query)?;

        let mut records = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(StoreError::Query)? {
            if let Some(record) = self.record_from_document(&document) {
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::DateTime;
    use similar_asserts::assert_eq;

    use super::*;

    async fn store() -> MongoStore {
        let config = Config::from_yaml_str("store: { url: 'mongodb://127.0.0.1:1' }").unwrap();
        MongoStore::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_range_filter() {
        let store = store().await;
        let filter = store.range_filter(TimeRange {
            after: UnixMillis::from_millis(1000),
            before: UnixMillis::from_millis(2000),
        });

        assert_eq!(
            filter,
            doc! {
                "insertTime": { "$gt": 1000_i64, "$lt": 2000_i64 },
                "callGetpath": { "$exists": true, "$nin": ["", Bson::Null] },
            }
        );
    }

    #[tokio::test]
    async fn test_latest_filter() {
        let store = store().await;
        assert_eq!(
            store.latest_filter(),
            doc! { "insertTime": { "$type": "number" } }
        );
    }

    #[tokio::test]
    async fn test_projection() {
        let store = store().await;
        assert_eq!(
            store.projection(&["callGetpath", "insertTime"]),
            doc! { "_id": 0, "callGetpath": 1, "insertTime": 1 }
        );
    }

    #[tokio::test]
    async fn test_record_from_document() {
        let store = store().await;

        let record = store
            .record_from_document(&doc! { "callGetpath": "H4sI", "insertTime": 1500_i64 })
            .unwrap();
        assert_eq!(record.blob, "H4sI");
        assert_eq!(record.inserted_at, UnixMillis::from_millis(1500));

        let record = store
            .record_from_document(&doc! { "callGetpath": "H4sI", "insertTime": 1600.0 })
            .unwrap();
        assert_eq!(record.inserted_at, UnixMillis::from_millis(1600));

        for document in [
            doc! { "callGetpath": "H4sI", "insertTime": DateTime::from_millis(1600) },
            doc! { "callGetpath": "", "insertTime": 1 },
            doc! { "callGetpath": 17, "insertTime": 1 },
            doc! { "insertTime": 1 },
            doc! { "callGetpath": "H4sI", "insertTime": "yesterday" },
        ] {
            assert_eq!(store.record_from_document(&document), None);
        }
    }
}
