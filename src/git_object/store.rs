use super::{Error, GitObject, Result, Sha1Hash};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Loose-object directory, `.git/objects/<2 hex>/<38 hex>`.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    dir: PathBuf,
}

impl ObjectStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compresses and stores `object`, returning its hash. Storing an object
    /// that is already present leaves the existing file untouched.
    pub fn persist(&self, object: &GitObject) -> Result<Sha1Hash> {
        let hash = object.hash();
        let path = self.path(&hash);

        if path.try_exists()? {
            trace!(%hash, "object already stored");
            return Ok(hash);
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("tmp");
        let f = File::create(&tmp)?;
        let mut e = ZlibEncoder::new(f, Compression::default());
        e.write_all(&object.serialize())?;
        e.finish()?;
        fs::rename(&tmp, &path)?;

        trace!(%hash, kind = %object.kind(), size = object.content().len(), "stored object");
        Ok(hash)
    }

    pub fn load(&self, hash: &Sha1Hash) -> Result<GitObject> {
        self.try_load(hash)?
            .ok_or_else(|| Error::ObjectNotFound(hash.hex()))
    }

    pub fn try_load(&self, hash: &Sha1Hash) -> Result<Option<GitObject>> {
        let f = match File::open(self.path(hash)) {
            Ok(f) => f,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut decoder = ZlibDecoder::new(f);
        let mut data = vec![];
        decoder.read_to_end(&mut data)?;

        let object = GitObject::deserialize(&data)?;
        if object.hash() != *hash {
            return Err(Error::format(format!(
                "object file {} is corrupt: content hashes to {}",
                hash,
                object.hash()
            )));
        }
        Ok(Some(object))
    }

    pub fn contains(&self, hash: &Sha1Hash) -> bool {
        self.path(hash).is_file()
    }

    fn path(&self, hash: &Sha1Hash) -> PathBuf {
        let hex = hash.hex();
        self.dir.join(&hex[..2]).join(&hex[2..])
    }
}

#[cfg(test)]
mod tests {
    use super::super::ObjectKind;
    use super::*;

    #[test]
    fn it_creates_filepath_from_sha1_hash() {
        let store = ObjectStore::new(".git/objects");
        let hash: Sha1Hash = "e88f7a929cd70b0274c4ea33b209c97fa845fdbc".parse().unwrap();
        assert_eq!(
            store.path(&hash),
            PathBuf::from(".git/objects/e8/8f7a929cd70b0274c4ea33b209c97fa845fdbc")
        );
    }

    #[test]
    fn it_persists_and_loads_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let obj = GitObject::new(ObjectKind::Commit, b"tree abc\n\nmsg\n".to_vec());

        let hash = store.persist(&obj).unwrap();
        assert_eq!(hash, obj.hash());
        assert!(store.contains(&hash));
        assert_eq!(store.load(&hash).unwrap(), obj);
    }

    #[test]
    fn it_persists_same_object_twice() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let obj = GitObject::new(ObjectKind::Blob, b"hello world".to_vec());

        let first = store.persist(&obj).unwrap();
        let second = store.persist(&obj).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.load(&first).unwrap(), obj);
    }

    #[test]
    fn it_reports_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = Sha1Hash::from([7u8; 20]);

        assert!(store.try_load(&hash).unwrap().is_none());
        assert!(matches!(store.load(&hash), Err(Error::ObjectNotFound(_))));
    }
}
