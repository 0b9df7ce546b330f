use crate::client::{get, with_retry};
use crate::http::*;
use crate::Result;
use futures::StreamExt;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

/// Suffix of an in-flight download; renamed away once the body has been fully written.
const PART_SUFFIX: &str = "part";

/// GET request a file from `url` and stream it to `path`.
///
/// Chunks are written as they arrive, so memory use does not grow with the file. The body
/// goes to `<path>.part` first and is renamed to `path` only after the last chunk is flushed;
/// a file found at `path` is therefore always complete, and a crash leaves at most a `.part`
/// file behind, which the next attempt overwrites.
pub async fn download_file(
    http_client: &HttpClient,
    url: &str,
    path: &Path,
    retries: u32,
    pb: &ProgressBar,
) -> Result<u64> {
    // ensure the directory exists
    if let Some(dir_path) = path.parent() {
        trace!("checking directory path: {:?}", dir_path);
        tokio::fs::create_dir_all(dir_path).await?;
    }

    let part = part_path(path);
    let written = with_retry(retries, url, || {
        let part = part.clone();
        async move {
            let response = get(http_client, url).await?;
            if let Some(len) = response.content_length() {
                pb.set_length(len);
            }
            pb.set_position(0);

            let mut file = BufWriter::new(File::create(&part).await?);
            let mut stream = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                pb.inc(chunk.len() as u64);
            }
            file.flush().await?;
            file.into_inner().sync_all().await?;
            Ok(written)
        }
    })
    .await?;

    tokio::fs::rename(&part, path).await?;
    debug!("{url} downloaded to {} ({written} bytes)", path.display());

    Ok(written)
}

/// The temporary path a download is written to before it is complete.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// List the files in `dir` whose names end with `suffix`, sorted by name.
///
/// A missing directory simply has no files.
pub fn list_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist yet", dir.display());
            return Ok(vec![]);
        }
        Err(err) => return Err(err.into()),
    };

    let mut files = vec![];
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix));
        if matches && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Reads a text file from `path`, replacing invalid UTF-8 rather than failing on it.
pub fn read_text(path: &Path) -> Result<String> {
    trace!("reading file path: {}", path.display());
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[test]
fn part_path_appends_suffix() {
    assert_eq!(
        part_path(Path::new("/data/2021/QTR2/20210510.nc.tar.gz")),
        PathBuf::from("/data/2021/QTR2/20210510.nc.tar.gz.part")
    );
}

#[test]
fn list_files_filters_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.nc", "a.nc", "c.nc.tar.gz", "d.nc.tar.gz.part"] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }
    std::fs::create_dir(dir.path().join("e.nc")).unwrap();

    let ncs = list_files(dir.path(), ".nc").unwrap();
    assert_eq!(ncs, vec![dir.path().join("a.nc"), dir.path().join("b.nc")]);

    let feeds = list_files(dir.path(), ".tar.gz").unwrap();
    assert_eq!(feeds, vec![dir.path().join("c.nc.tar.gz")]);

    assert!(list_files(&dir.path().join("missing"), ".nc")
        .unwrap()
        .is_empty());
}
