use derive_new::new;
use rocksdb::DBIterator;

use crate::db::DbResult;

/// An iterator over the raw entries sharing a key prefix. Stops at the first
/// key outside the prefix.
#[derive(new)]
pub struct PrefixIterator<'a> {
    iter: DBIterator<'a>,
    prefix: &'a [u8],
    #[new(default)]
    done: bool,
}

impl Iterator for PrefixIterator<'_> {
    type Item = DbResult<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.iter.next()? {
            Ok((k, v)) if k.starts_with(self.prefix) => Some(Ok((k, v))),
            Ok(_) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}
