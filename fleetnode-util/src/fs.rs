use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::crypto::{ALPHA_NUM, pseudorandom_string};

/// Atomically creates a file with the given contents, overwriting
/// it if one exists.
///
/// This function will first write the buffer into a new file that
/// resides in the same directory as the desired file and then do
/// the complete sync/rename dance to ensure the buffer is safely
/// written to disk. If this function returns successfully, you can
/// be reasonably sure the write completed durably.
///
/// Read: [Ensuring data reaches to disk](https://lwn.net/Articles/457667/).
pub async fn safe_write_all<P: AsRef<Path>, B: AsRef<[u8]>>(path: P, buf: B) -> io::Result<()> {
    // create temp file
    let tmp_ext = "sync-".to_owned() + &pseudorandom_string(ALPHA_NUM, 6);
    let tmp_path = path.as_ref().with_extension(tmp_ext);
    let mut tmp_file = fs::File::create(&tmp_path).await?;

    // write given contents and sync to disk
    let res = async {
        tmp_file.write_all(buf.as_ref()).await?;
        tmp_file.flush().await?;
        tmp_file.sync_all().await
    }
    .await;
    drop(tmp_file);

    if let Err(err) = res {
        // do not leave partial files behind
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    // rename tmp file to destination
    fs::rename(&tmp_path, path.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_safe_write_all_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record.json");

        safe_write_all(&path, b"first").await.unwrap();
        safe_write_all(&path, b"second").await.unwrap();

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "second");

        // only the destination file remains
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().into_string().unwrap());
        }
        assert_eq!(names, vec!["record.json".to_string()]);
    }
}
