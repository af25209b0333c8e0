use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::storage::Snapshot;

/// Write the snapshot as gzip-compressed bincode.
///
/// The data goes to a temp file next to `path` which is then renamed over
/// it, so a crash mid-write leaves the previous snapshot intact.
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let encoder = GzEncoder::new(tmp.as_file(), Compression::default());
        let mut writer = BufWriter::new(encoder);
        serialize_into(&mut writer, snapshot)?;
        writer.flush()?;
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a snapshot written by [`save_snapshot`].
///
/// A missing file yields `None`.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(GzDecoder::new(file));
    let snapshot: Snapshot = deserialize_from(&mut reader)?;
    Ok(Some(snapshot))
}
