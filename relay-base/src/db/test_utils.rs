use std::future::Future;

use rocksdb::Options;
use tempfile::TempDir;

use crate::db::DB;

/// Open a fresh db in a temporary directory, hand it to `test` and destroy it
/// afterwards.
pub async fn run_test_db<T, Fut>(test: T)
where
    T: FnOnce(DB) -> Fut,
    Fut: Future<Output = ()>,
{
    // Use `/tmp`-equivalent so that any resource leak of the db files will
    // eventually be cleaned up, even if e.g. TempDir's drop handler never runs
    // due to a segfault etc encountered during the test.
    let db_tmp_dir = TempDir::new().unwrap();
    let db = DB::from_path(db_tmp_dir.path()).unwrap();
    test(db).await;
    let _ = rocksdb::DB::destroy(&Options::default(), db_tmp_dir);
}
