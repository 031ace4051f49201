//! On-disk format of the object pool.
//!
//! The file is a plain sequence of [`ID_LENGTH`]-byte identifiers without delimiters or header.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::object::{ID_LENGTH, ObjectId};

/// Reads a persisted pool. A missing file yields an empty pool.
pub fn read_pool(path: &Path) -> Result<Vec<ObjectId>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io(format!("opening {}", path.display()), err)),
    };

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|err| Error::io(format!("reading {}", path.display()), err))?;

    if contents.len() % ID_LENGTH != 0 {
        return Err(Error::MalformedPool(format!(
            "{} has {} bytes, not a multiple of {ID_LENGTH}",
            path.display(),
            contents.len()
        )));
    }

    contents
        .chunks_exact(ID_LENGTH)
        .map(ObjectId::from_slice)
        .collect()
}

/// Atomically replaces the pool at `path` with `ids`.
///
/// The identifiers are written to a temporary file in the same directory which is synced and then
/// renamed over the target, so readers never observe a partially written pool.
pub fn write_pool(path: &Path, ids: &[ObjectId]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(dir)
        .map_err(|err| Error::io(format!("creating temp file in {}", dir.display()), err))?;

    let mut writer = BufWriter::new(temp);
    for id in ids {
        writer
            .write_all(id.as_bytes())
            .map_err(|err| Error::io("writing object pool", err))?;
    }

    let temp = writer
        .into_inner()
        .map_err(|err| Error::io("flushing object pool", err.into_error()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| Error::io("syncing object pool", err))?;
    temp.persist(path)
        .map_err(|err| Error::io(format!("replacing {}", path.display()), err.error))?;

    Ok(())
}
