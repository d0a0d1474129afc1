use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use relay_core::{MessageKey, Pagination, RouteMessage, TransactionObject};

use crate::db::{typed_db::decode, DbError, DbResult, TypedDB, DB};

const BLOCK_PREFIX: &str = "block";
const MESSAGE_PREFIX: &str = "message";
const FINALITY_PREFIX: &str = "finality";

/// Last processed height per chain. Key: `block-<chain>`.
#[derive(Debug, Clone)]
pub struct BlockStore(TypedDB);

impl BlockStore {
    /// Block store over `db`
    pub fn new(db: DB) -> Self {
        Self(TypedDB::new(BLOCK_PREFIX.to_owned(), db))
    }

    /// Persist the height of `chain`
    pub fn store_height(&self, chain: &str, height: u64) -> DbResult<()> {
        trace!(chain, height, "Storing block height");
        self.0.store_json(&self.0.key(&[chain]), &height)
    }

    /// Last persisted height of `chain`, zero if nothing was stored yet
    pub fn last_stored_height(&self, chain: &str) -> DbResult<u64> {
        Ok(self
            .0
            .retrieve_json(&self.0.key(&[chain]))?
            .unwrap_or_default())
    }
}

/// Messages awaiting delivery. Key: `message-<src>-<sn>`.
#[derive(Debug, Clone)]
pub struct MessageStore(TypedDB);

impl MessageStore {
    /// Message store over `db`
    pub fn new(db: DB) -> Self {
        Self(TypedDB::new(MESSAGE_PREFIX.to_owned(), db))
    }

    fn key_of(&self, key: &MessageKey) -> String {
        self.0.key(&[key.src.as_str(), key.sn.to_string().as_str()])
    }

    fn chain_prefix(&self, chain: &str) -> String {
        if chain.is_empty() {
            self.0.scan_prefix::<&str>(&[])
        } else {
            self.0.scan_prefix(&[chain])
        }
    }

    /// Whether a key found below the prefix of `chain` really belongs to it.
    ///
    /// Chain ids may contain the separator, so scanning `mock` also walks the
    /// keys of `mock-1`. Those are told apart by the remainder, which is a
    /// bare sequence number only for the scanned chain.
    fn owned_by(chain: &str, prefix_len: usize) -> impl Fn(&[u8]) -> bool {
        let any = chain.is_empty();
        move |key: &[u8]| {
            any || key
                .get(prefix_len..)
                .is_some_and(|sn| !sn.is_empty() && sn.iter().all(u8::is_ascii_digit))
        }
    }

    /// Insert or overwrite a message
    pub fn store_message(&self, message: &RouteMessage) -> DbResult<()> {
        let key = self.key_of(&message.key());
        debug!(%key, retry = message.retry, "Storing message");
        self.0.store_json(&key, message)
    }

    /// Fetch a message, failing with [`DbError::NotFound`] if absent
    pub fn get_message(&self, key: &MessageKey) -> DbResult<RouteMessage> {
        let db_key = self.key_of(key);
        self.0
            .retrieve_json(&db_key)?
            .ok_or(DbError::NotFound(db_key))
    }

    /// Page through the messages of `chain` (every chain if empty) in key
    /// order.
    pub fn get_messages(&self, chain: &str, pagination: Pagination) -> DbResult<Vec<RouteMessage>> {
        let prefix = self.chain_prefix(chain);
        let owned = Self::owned_by(chain, prefix.len());
        paginate(&self.0, &prefix, pagination, owned)
    }

    /// Number of stored messages
    pub fn total_count(&self) -> DbResult<usize> {
        self.total_count_by_chain("")
    }

    /// Number of stored messages originating from `chain`
    pub fn total_count_by_chain(&self, chain: &str) -> DbResult<usize> {
        let prefix = self.chain_prefix(chain);
        let owned = Self::owned_by(chain, prefix.len());
        count(&self.0, &prefix, owned)
    }

    /// Delete a message; deleting a missing message is a no-op
    pub fn delete_message(&self, key: &MessageKey) -> DbResult<()> {
        let key = self.key_of(key);
        debug!(%key, "Deleting message");
        self.0.delete(&key)
    }
}

/// Delivered messages awaiting destination finality.
/// Key: `finality-<dst>-<src>-<sn>`.
#[derive(Debug, Clone)]
pub struct FinalityStore(TypedDB);

impl FinalityStore {
    /// Finality store over `db`
    pub fn new(db: DB) -> Self {
        Self(TypedDB::new(FINALITY_PREFIX.to_owned(), db))
    }

    fn key_of(&self, dst: &str, key: &MessageKey) -> String {
        self.0
            .key(&[dst, key.src.as_str(), key.sn.to_string().as_str()])
    }

    /// Track a delivered transaction
    pub fn store_tx_object(&self, tx: &TransactionObject) -> DbResult<()> {
        self.0.store_json(&self.key_of(&tx.dst, &tx.key), tx)
    }

    /// Fetch the tracked delivery of `key` to `dst`
    pub fn get_tx_object(&self, dst: &str, key: &MessageKey) -> DbResult<TransactionObject> {
        let db_key = self.key_of(dst, key);
        self.0
            .retrieve_json(&db_key)?
            .ok_or(DbError::NotFound(db_key))
    }

    /// Page through every tracked transaction
    pub fn get_tx_objects(&self, pagination: Pagination) -> DbResult<Vec<TransactionObject>> {
        let prefix = self.0.scan_prefix::<&str>(&[]);
        paginate(&self.0, &prefix, pagination, |_| true)
    }

    /// Stop tracking the delivery of `key` to `dst`
    pub fn delete_tx_object(&self, dst: &str, key: &MessageKey) -> DbResult<()> {
        self.0.delete(&self.key_of(dst, key))
    }
}

fn count(db: &TypedDB, prefix: &str, keep: impl Fn(&[u8]) -> bool) -> DbResult<usize> {
    let mut count = 0;
    for entry in db.prefix_iterator(prefix) {
        let (key, _) = entry?;
        if keep(&*key) {
            count += 1;
        }
    }
    Ok(count)
}

fn paginate<V: DeserializeOwned>(
    db: &TypedDB,
    prefix: &str,
    pagination: Pagination,
    keep: impl Fn(&[u8]) -> bool,
) -> DbResult<Vec<V>> {
    let mut iter = db.prefix_iterator(prefix).filter(|entry| match entry {
        Ok((key, _)) => keep(&**key),
        Err(_) => true,
    });
    if !pagination.all {
        for skipped in 0..pagination.offset {
            match iter.next() {
                Some(entry) => {
                    entry?;
                }
                None => {
                    return Err(DbError::OffsetOutOfRange {
                        offset: pagination.offset,
                        available: skipped,
                    })
                }
            }
        }
    }
    let limit = if pagination.all {
        usize::MAX
    } else {
        pagination.limit
    };
    iter.take(limit)
        .map(|entry| {
            let (k, v) = entry?;
            decode(&k, &v)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use relay_core::{EventType, Message};

    use crate::db::test_utils::run_test_db;

    use super::*;

    fn route_message(src: &str, sn: u64) -> RouteMessage {
        RouteMessage::new(Message {
            dst: "archway".into(),
            src: src.into(),
            sn,
            data: b"test message".to_vec(),
            message_height: 100 + sn,
            event_type: EventType::EmitMessage,
            req_id: None,
        })
    }

    #[tokio::test]
    async fn block_store_roundtrip() {
        run_test_db(|db| async move {
            let store = BlockStore::new(db);
            assert_eq!(store.last_stored_height("icon").unwrap(), 0);
            store.store_height("icon", 42).unwrap();
            store.store_height("archway", 7).unwrap();
            assert_eq!(store.last_stored_height("icon").unwrap(), 42);
            assert_eq!(store.last_stored_height("archway").unwrap(), 7);
        })
        .await;
    }

    #[tokio::test]
    async fn message_store_get_count_delete() {
        run_test_db(|db| async move {
            let store = MessageStore::new(db);
            let msg = route_message("icon", 1);
            store.store_message(&msg).unwrap();
            store.store_message(&route_message("icon2", 1)).unwrap();

            assert_eq!(store.total_count_by_chain("icon").unwrap(), 1);
            assert_eq!(store.total_count_by_chain("archway").unwrap(), 0);
            assert_eq!(store.total_count().unwrap(), 2);
            assert_eq!(store.get_message(&msg.key()).unwrap(), msg);

            let missing = MessageKey::new("archway".into(), 1);
            assert!(matches!(
                store.get_message(&missing),
                Err(DbError::NotFound(_))
            ));

            store.delete_message(&msg.key()).unwrap();
            store.delete_message(&msg.key()).unwrap();
            assert!(store.get_message(&msg.key()).is_err());
            assert_eq!(store.total_count().unwrap(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn message_store_pagination() {
        run_test_db(|db| async move {
            let store = MessageStore::new(db);
            assert!(store
                .get_messages("icon", Pagination::default().with_limit(10))
                .unwrap()
                .is_empty());

            for sn in 1..=3 {
                store.store_message(&route_message("icon", sn)).unwrap();
            }
            store.store_message(&route_message("other", 9)).unwrap();

            let all = store
                .get_messages("icon", Pagination::default().get_all())
                .unwrap();
            assert_eq!(all.len(), 3);

            let page = store
                .get_messages("icon", Pagination::default().with_limit(2).with_offset(1))
                .unwrap();
            let sns: Vec<_> = page.iter().map(|m| m.message.sn).collect();
            assert_eq!(sns, vec![2, 3]);

            let err = store
                .get_messages("icon", Pagination::default().with_limit(1).with_offset(14))
                .unwrap_err();
            assert!(matches!(
                err,
                DbError::OffsetOutOfRange {
                    offset: 14,
                    available: 3
                }
            ));

            assert_eq!(
                store
                    .get_messages("", Pagination::default().get_all())
                    .unwrap()
                    .len(),
                4
            );
        })
        .await;
    }

    #[tokio::test]
    async fn chain_scan_skips_chains_extending_the_id() {
        run_test_db(|db| async move {
            let store = MessageStore::new(db);
            store.store_message(&route_message("mock", 1)).unwrap();
            store.store_message(&route_message("mock", 2)).unwrap();
            for sn in 1..=3 {
                store.store_message(&route_message("mock-1", sn)).unwrap();
            }

            assert_eq!(store.total_count_by_chain("mock").unwrap(), 2);
            assert_eq!(store.total_count_by_chain("mock-1").unwrap(), 3);
            assert_eq!(store.total_count().unwrap(), 5);

            let own = store
                .get_messages("mock", Pagination::default().get_all())
                .unwrap();
            assert!(own.iter().all(|m| m.message.src == "mock"));
            assert_eq!(own.len(), 2);

            let page = store
                .get_messages("mock", Pagination::default().with_limit(5).with_offset(1))
                .unwrap();
            assert_eq!(page.len(), 1);
            assert_eq!(page[0].message.src, "mock");
            assert!(matches!(
                store.get_messages("mock", Pagination::default().with_limit(1).with_offset(3)),
                Err(DbError::OffsetOutOfRange {
                    offset: 3,
                    available: 2
                })
            ));
        })
        .await;
    }

    #[tokio::test]
    async fn finality_store_roundtrip() {
        run_test_db(|db| async move {
            let store = FinalityStore::new(db);
            let key = MessageKey::new("icon".into(), 5);
            let tx = TransactionObject::new(
                key.clone(),
                "archway".into(),
                120,
                "0xdead".into(),
                300,
            );
            store.store_tx_object(&tx).unwrap();
            assert_eq!(store.get_tx_object("archway", &key).unwrap(), tx);
            assert_eq!(
                store.get_tx_objects(Pagination::default()).unwrap(),
                vec![tx]
            );
            store.delete_tx_object("archway", &key).unwrap();
            assert!(store
                .get_tx_objects(Pagination::default().get_all())
                .unwrap()
                .is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn finality_store_keeps_same_sn_from_different_sources() {
        run_test_db(|db| async move {
            let store = FinalityStore::new(db);
            let from_icon = MessageKey::new("icon".into(), 5);
            let from_sui = MessageKey::new("sui".into(), 5);
            for (key, tx_hash) in [(&from_icon, "0x01"), (&from_sui, "0x02")] {
                let tx = TransactionObject::new(key.clone(), "archway".into(), 120, tx_hash.into(), 300);
                store.store_tx_object(&tx).unwrap();
            }

            assert_eq!(
                store
                    .get_tx_objects(Pagination::default().get_all())
                    .unwrap()
                    .len(),
                2
            );
            assert_eq!(store.get_tx_object("archway", &from_icon).unwrap().tx_hash, "0x01");
            assert_eq!(store.get_tx_object("archway", &from_sui).unwrap().tx_hash, "0x02");

            store.delete_tx_object("archway", &from_icon).unwrap();
            assert!(matches!(
                store.get_tx_object("archway", &from_icon),
                Err(DbError::NotFound(_))
            ));
            assert_eq!(store.get_tx_object("archway", &from_sui).unwrap().tx_hash, "0x02");
        })
        .await;
    }
}
