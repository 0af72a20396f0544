use rocksdb::{DB, Direction, Error as RocksError, IteratorMode, ReadOptions, WriteBatch};
use std::sync::Arc;

/// Namespaced view over the shared RocksDB: every key is transparently
/// prefixed, so independent stores can share one database handle.
#[derive(Clone)]
pub struct Mdb {
    db: Arc<DB>,
    prefix: Vec<u8>,
}

impl Mdb {
    pub fn from_db(db: Arc<DB>, prefix: impl AsRef<[u8]>) -> Self {
        Self { db, prefix: prefix.as_ref().to_vec() }
    }

    #[inline]
    pub fn prefixed(&self, k: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + k.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(k);
        out
    }

    pub fn get(&self, k: &[u8]) -> Result<Option<Vec<u8>>, RocksError> {
        self.db.get(self.prefixed(k))
    }

    pub fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, RocksError> {
        // Apply the namespace prefix to each RELATIVE key, preserving order.
        let prefixed: Vec<Vec<u8>> = keys.iter().map(|k| self.prefixed(k)).collect();
        let results = self.db.multi_get(prefixed);

        let mut out = Vec::with_capacity(results.len());
        for r in results {
            match r {
                Ok(Some(slice)) => out.push(Some(slice.to_vec())),
                Ok(None) => out.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub fn put(&self, k: &[u8], v: &[u8]) -> Result<(), RocksError> {
        self.db.put(self.prefixed(k), v)
    }

    pub fn bulk_write<F>(&self, build: F) -> Result<(), RocksError>
    where
        F: FnOnce(&mut MdbBatch<'_>),
    {
        let mut wb = WriteBatch::default();
        {
            let mut mb = MdbBatch { mdb: self, wb: &mut wb };
            build(&mut mb);
        }
        self.db.write(wb)
    }

    /// List RELATIVE keys under `rel_prefix` within this namespace.
    pub fn scan_prefix(&self, rel_prefix: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut start = self.prefix.clone();
        start.extend_from_slice(rel_prefix);

        // compute upper bound
        let mut ub = start.clone();
        for i in (0..ub.len()).rev() {
            if ub[i] != 0xff {
                ub[i] += 1;
                ub.truncate(i + 1);
                break;
            }
            if i == 0 {
                ub.clear(); // no UB; iterate all, we will break by prefix
            }
        }

        let mut ro = ReadOptions::default();
        if !ub.is_empty() {
            ro.set_iterate_upper_bound(ub);
        }
        ro.set_total_order_seek(true);

        let it = self.db.iterator_opt(IteratorMode::From(&start, Direction::Forward), ro);
        let mut keys = Vec::new();
        for kv in it {
            let (k_full, _v) = kv?;
            if !k_full.starts_with(&start) {
                break;
            }
            let rel = &k_full[self.prefix.len()..];
            keys.push(rel.to_vec());
        }
        Ok(keys)
    }

    #[inline]
    pub fn inner_db(&self) -> &DB {
        &self.db
    }

    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }
}

pub struct MdbBatch<'a> {
    mdb: &'a Mdb,
    wb: &'a mut WriteBatch,
}

impl<'a> MdbBatch<'a> {
    #[inline]
    pub fn put(&mut self, k: &[u8], v: &[u8]) {
        self.wb.put(self.mdb.prefixed(k), v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocksdb::Options;

    fn scratch_db() -> (tempfile::TempDir, Arc<DB>) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, dir.path()).expect("open scratch DB");
        (dir, Arc::new(db))
    }

    #[test]
    fn namespaces_do_not_leak() {
        let (_dir, db) = scratch_db();
        let a = Mdb::from_db(db.clone(), b"a:");
        let b = Mdb::from_db(db, b"b:");

        a.put(b"k", b"va").unwrap();
        b.put(b"k", b"vb").unwrap();

        assert_eq!(a.get(b"k").unwrap(), Some(b"va".to_vec()));
        assert_eq!(b.get(b"k").unwrap(), Some(b"vb".to_vec()));
    }

    #[test]
    fn bulk_write_lands_atomically() {
        let (_dir, db) = scratch_db();
        let mdb = Mdb::from_db(db, b"chain:");

        mdb.bulk_write(|wb| {
            wb.put(b"x", b"1");
            wb.put(b"y", b"2");
        })
        .unwrap();

        assert_eq!(mdb.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(mdb.get(b"y").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn scan_prefix_returns_relative_keys() {
        let (_dir, db) = scratch_db();
        let mdb = Mdb::from_db(db, b"chain:");

        mdb.put(b"t/1", b"a").unwrap();
        mdb.put(b"t/2", b"b").unwrap();
        mdb.put(b"u/1", b"c").unwrap();

        let keys = mdb.scan_prefix(b"t/").unwrap();
        assert_eq!(keys, vec![b"t/1".to_vec(), b"t/2".to_vec()]);
    }
}
