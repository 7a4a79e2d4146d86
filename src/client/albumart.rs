use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::MpdClient;
use crate::error::{MpdError, Result};
use crate::protocol::parse::{parse_binary_chunk, sanitize_file_component};
use crate::protocol::Command;

const FILE_PREFIX: &str = "albumart_";

/// A picture written to the album art directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumArt {
    pub artist: String,
    pub album: String,
    /// Song the picture was read from
    pub song: String,
    pub path: PathBuf,
    pub size: u64,
}

async fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial album art {:?}: {}", path, e);
        }
    }
}

/// Where the picture for `artist`/`album` is stored
pub fn album_art_path(dir: &Path, artist: &str, album: &str) -> PathBuf {
    let name = sanitize_file_component(&format!("{}_{}", artist, album));
    dir.join(format!("{}{}.png", FILE_PREFIX, name))
}

impl MpdClient {
    pub fn album_art_dir(&self) -> &Path {
        &self.inner.options.album_art_dir
    }

    pub fn album_art_supported(&self) -> bool {
        self.version().supports_album_art()
    }

    /// Fetch the cover file next to `uri` with `albumart`
    pub async fn album_art(
        &self,
        uri: &str,
        artist: &str,
        album: &str,
        progress: impl FnMut(u64, u64),
    ) -> Result<AlbumArt> {
        if !self.version().supports_album_art() {
            return Err(MpdError::Unsupported("albumart".to_string()));
        }
        self.fetch_picture("albumart", uri, artist, album, progress)
            .await
    }

    /// Fetch the picture embedded in `uri` with `readpicture`
    pub async fn read_picture(
        &self,
        uri: &str,
        artist: &str,
        album: &str,
        progress: impl FnMut(u64, u64),
    ) -> Result<AlbumArt> {
        if !self.version().supports_read_picture() {
            return Err(MpdError::Unsupported("readpicture".to_string()));
        }
        self.fetch_picture("readpicture", uri, artist, album, progress)
            .await
    }

    /// Raise the chunk size for binary replies. A no-op on older servers.
    pub async fn binary_limit(&self, limit: u32) -> Result<()> {
        if !self.version().supports_read_picture() {
            return Ok(());
        }
        self.ok(Command::new("binarylimit").arg(limit)).await
    }

    /// Album art from the first song of an album
    pub async fn album_art_for_album(
        &self,
        artist: &str,
        album: &str,
        progress: impl FnMut(u64, u64),
    ) -> Result<AlbumArt> {
        let songs = self.songs_for_album(album, Some(artist)).await?;
        let Some(first) = songs.first() else {
            debug!("Songs for {} {} not found", artist, album);
            return Err(MpdError::NoAlbumArt {
                artist: artist.to_string(),
                album: album.to_string(),
            });
        };
        self.album_art(&first.file, artist, album, progress).await
    }

    async fn fetch_picture(
        &self,
        command: &str,
        uri: &str,
        artist: &str,
        album: &str,
        progress: impl FnMut(u64, u64),
    ) -> Result<AlbumArt> {
        let dir = self.album_art_dir();
        fs::create_dir_all(dir).await?;
        let path = album_art_path(dir, artist, album);

        match self.write_picture(command, uri, &path, progress).await {
            Ok(Some(size)) => {
                info!("Saved album art for {} {} to {:?}", artist, album, path);
                Ok(AlbumArt {
                    artist: artist.to_string(),
                    album: album.to_string(),
                    song: uri.to_string(),
                    path,
                    size,
                })
            }
            Ok(None) => {
                remove_partial(&path).await;
                Err(MpdError::NoAlbumArt {
                    artist: artist.to_string(),
                    album: album.to_string(),
                })
            }
            Err(e) => {
                remove_partial(&path).await;
                Err(e)
            }
        }
    }

    /// Stream the picture into `path`. `None` when the server has no picture.
    async fn write_picture(
        &self,
        command: &str,
        uri: &str,
        path: &Path,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<Option<u64>> {
        let mut file = fs::File::create(path).await?;
        let mut offset: u64 = 0;
        loop {
            let response = self
                .execute(Command::new(command).quoted(uri).arg(offset))
                .await?;
            let chunk = parse_binary_chunk(&response.body);
            let data = response.binary.unwrap_or_default();
            let Some(size) = chunk.size else {
                return Ok(None);
            };

            file.write_all(&data).await?;
            offset += chunk.binary.unwrap_or(data.len() as u64);
            if offset >= size {
                file.flush().await?;
                return Ok(Some(size));
            }
            if data.is_empty() {
                return Err(MpdError::Protocol(format!(
                    "{} returned an empty chunk at {} of {}",
                    command, offset, size
                )));
            }
            progress(offset, size);
        }
    }

    /// Album art files written so far, sorted
    pub async fn list_album_art(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(self.album_art_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let is_art = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(FILE_PREFIX));
            if is_art {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Delete one album art file by name
    pub async fn delete_album_art(&self, file_name: &str) -> Result<()> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| MpdError::Protocol(format!("not a file name: {}", file_name)))?;
        fs::remove_file(self.album_art_dir().join(name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{connected_with, options};
    use super::*;
    use crate::connection::MockTransport;

    fn chunk(size: usize, payload: &[u8]) -> Vec<u8> {
        let mut body = format!("size: {}\ntype: image/png\nbinary: {}\n", size, payload.len())
            .into_bytes();
        body.extend_from_slice(payload);
        body.push(b'\n');
        body
    }

    async fn client_in(dir: &Path, mock: &MockTransport) -> MpdClient {
        let mut options = options();
        options.album_art_dir = dir.to_path_buf();
        connected_with(mock, options).await
    }

    #[test]
    fn test_album_art_path_is_sanitized() {
        let path = album_art_path(Path::new("/art"), "AC/DC", "Back in Black");
        assert_eq!(path, PathBuf::from("/art/albumart_AC_DC_Back_in_Black.png"));
    }

    #[tokio::test]
    async fn test_album_art_is_fetched_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.reply(
            "albumart \"a/01.flac\" 0",
            crate::connection::MockReply::Ok(chunk(6, b"\x89PN")),
        );
        mock.reply(
            "albumart \"a/01.flac\" 3",
            crate::connection::MockReply::Ok(chunk(6, b"G\r\n")),
        );
        let client = client_in(dir.path(), &mock).await;

        let mut seen = Vec::new();
        let art = client
            .album_art("a/01.flac", "Artist", "Album", |done, total| {
                seen.push((done, total))
            })
            .await
            .unwrap();

        assert_eq!(art.size, 6);
        assert_eq!(seen, vec![(3, 6)]);
        assert_eq!(std::fs::read(&art.path).unwrap(), b"\x89PNG\r\n");
        assert_eq!(client.list_album_art().await.unwrap(), vec![art.path.clone()]);

        client
            .delete_album_art("albumart_Artist_Album.png")
            .await
            .unwrap();
        assert!(client.list_album_art().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_art_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        let client = client_in(dir.path(), &mock).await;

        match client.album_art("a.mp3", "X", "Y", |_, _| {}).await {
            Err(MpdError::NoAlbumArt { artist, album }) => {
                assert_eq!((artist.as_str(), album.as_str()), ("X", "Y"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.list_album_art().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_chunk_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.reply(
            "albumart \"a.mp3\" 0",
            crate::connection::MockReply::Ok(chunk(10, b"abc")),
        );
        mock.reply(
            "albumart \"a.mp3\" 3",
            crate::connection::MockReply::Ok(chunk(10, b"")),
        );
        let client = client_in(dir.path(), &mock).await;

        assert!(matches!(
            client.album_art("a.mp3", "X", "Y", |_, _| {}).await,
            Err(MpdError::Protocol(_))
        ));
        assert!(client.list_album_art().await.unwrap().is_empty());
        assert!(!album_art_path(dir.path(), "X", "Y").exists());
    }

    #[tokio::test]
    async fn test_failed_request_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.reply(
            "albumart \"a.mp3\" 0",
            crate::connection::MockReply::Ok(chunk(10, b"abc")),
        );
        mock.reply(
            "albumart \"a.mp3\" 3",
            crate::connection::MockReply::Ack("ACK [50@0] {albumart} No file exists".to_string()),
        );
        let client = client_in(dir.path(), &mock).await;

        assert!(matches!(
            client.album_art("a.mp3", "X", "Y", |_, _| {}).await,
            Err(MpdError::Ack(_))
        ));
        assert!(client.list_album_art().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_version_gates() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        mock.set_version("0.21.0");
        let client = client_in(dir.path(), &mock).await;

        assert!(client.album_art_supported());
        assert!(matches!(
            client.read_picture("a.mp3", "X", "Y", |_, _| {}).await,
            Err(MpdError::Unsupported(_))
        ));
        client.binary_limit(65536).await.unwrap();
        assert!(mock.take_sent_commands().is_empty());

        let old = MockTransport::new();
        old.set_version("0.20.0");
        let client = client_in(dir.path(), &old).await;
        assert!(!client.album_art_supported());
    }

    #[tokio::test]
    async fn test_album_without_songs_has_no_art() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        let client = client_in(dir.path(), &mock).await;
        assert!(matches!(
            client.album_art_for_album("X", "Y", |_, _| {}).await,
            Err(MpdError::NoAlbumArt { .. })
        ));
    }
}
