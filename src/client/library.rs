use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

use super::MpdClient;
use crate::core::{Album, Artist, FileList, Song, Stats, Status};
use crate::error::Result;
use crate::protocol::parse::{
    parse_albums, parse_albums_for_artist, parse_artists, parse_count, parse_current_song,
    parse_decoder_suffixes, parse_file_list, parse_genres, parse_lines, parse_songs,
    parse_songs_limited, parse_stats, parse_status, sort_songs_by_track, SONG_SEARCH_LIMIT,
};
use crate::protocol::{filter_and, filter_eq, Command, CommandList};

impl MpdClient {
    pub(crate) async fn login(&self, password: &str) -> Result<()> {
        self.ok(Command::new("password").quoted(password)).await
    }

    /// Fetch the file suffixes the server can decode
    pub(crate) async fn load_decoder_suffixes(&self) -> Result<()> {
        let suffixes = parse_decoder_suffixes(&self.body(Command::new("decoders")).await?);
        debug!("Server decodes {} suffixes", suffixes.len());
        self.inner.state.lock().await.decoder_suffixes = suffixes;
        Ok(())
    }

    /// Search every tag for `filter`. The window is only sent to servers
    /// that understand it.
    pub async fn search(&self, filter: &str, window: Option<(u32, u32)>) -> Result<Vec<Song>> {
        let mut cmd = Command::new("search").arg("any").quoted(filter);
        if let Some((start, end)) = window {
            if self.version().supports_search_window() {
                cmd = cmd.arg("window").arg(format!("{}:{}", start, end));
            }
        }
        Ok(parse_songs(&self.body(cmd).await?))
    }

    pub async fn artists(&self, filter: Option<&str>) -> Result<Vec<Artist>> {
        let body = self.body(Command::new("list").arg("artist")).await?;
        Ok(parse_artists(&body, filter))
    }

    /// All albums grouped by album artist (or artist)
    pub async fn albums(&self, use_album_artist: bool, sort_by_artist: bool) -> Result<Vec<Album>> {
        let group = if use_album_artist { "albumartist" } else { "artist" };
        let body = self
            .body(Command::new("list").arg("album").arg("group").arg(group))
            .await?;
        Ok(parse_albums(
            &body,
            self.version().legacy_grouping(),
            sort_by_artist,
        ))
    }

    pub async fn albums_for_artist(&self, artist: &str, sort_by_date: bool) -> Result<Vec<Album>> {
        let mut cmd = Command::new("list").arg("album").arg("artist").quoted(artist);
        if sort_by_date {
            cmd = cmd.arg("group").arg("date");
        }
        let body = self.body(cmd).await?;
        Ok(parse_albums_for_artist(
            &body,
            artist,
            self.version().legacy_grouping(),
            sort_by_date,
        ))
    }

    /// Songs of an album in track order
    pub async fn songs_for_album(&self, album: &str, artist: Option<&str>) -> Result<Vec<Song>> {
        let mut cmd = Command::new("find").arg("album").quoted(album);
        if let Some(artist) = artist {
            cmd = cmd.arg("artist").quoted(artist);
        }
        let mut songs = parse_songs(&self.body(cmd).await?);
        sort_songs_by_track(&mut songs);
        Ok(songs)
    }

    /// Search one tag (title by default); at most 100 songs come back
    pub async fn songs(&self, filter: &str, tag: Option<&str>) -> Result<Vec<Song>> {
        let cmd = Command::new("search")
            .arg(tag.unwrap_or("title"))
            .quoted(filter);
        Ok(parse_songs_limited(&self.body(cmd).await?, SONG_SEARCH_LIMIT))
    }

    fn without_album_filter(artist: &str) -> String {
        filter_and(&[filter_eq("Artist", artist), filter_eq("album", "")])
    }

    /// Number of songs by `artist` that have no album tag. Always 0 on
    /// servers without filter expressions.
    pub async fn song_count_without_album(&self, artist: &str) -> Result<u32> {
        if !self.version().supports_filter_expressions() {
            return Ok(0);
        }
        let cmd = Command::new("count").quoted(&Self::without_album_filter(artist));
        Ok(parse_count(&self.body(cmd).await?))
    }

    pub async fn songs_without_album(&self, artist: &str) -> Result<Vec<Song>> {
        if !self.version().supports_filter_expressions() {
            return Ok(Vec::new());
        }
        let cmd = Command::new("find").quoted(&Self::without_album_filter(artist));
        let mut songs = parse_songs(&self.body(cmd).await?);
        sort_songs_by_track(&mut songs);
        Ok(songs)
    }

    /// Genres mapped to the albums tagged with them
    pub async fn genres(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let body = self
            .body(Command::new("list").arg("genre").arg("group").arg("album"))
            .await?;
        Ok(parse_genres(&body))
    }

    pub async fn songs_for_genre(&self, genre: &str) -> Result<Vec<Song>> {
        let body = self
            .body(Command::new("find").arg("genre").quoted(genre))
            .await?;
        let mut songs = parse_songs(&body);
        sort_songs_by_track(&mut songs);
        Ok(songs)
    }

    /// Browse a directory (the music root when `uri` is empty). Only files
    /// the server can decode are listed.
    pub async fn list_files(&self, uri: Option<&str>, sort_by_title: bool) -> Result<FileList> {
        let mut cmd = Command::new("lsinfo");
        if let Some(uri) = uri.filter(|u| !u.is_empty()) {
            // callers may hand back percent-encoded uris
            let decoded = urlencoding::decode(uri).unwrap_or(Cow::Borrowed(uri));
            cmd = cmd.quoted(&decoded);
        }
        let body = self.body(cmd).await?;
        let state = self.inner.state.lock().await;
        Ok(parse_file_list(&body, &state.decoder_suffixes, sort_by_title))
    }

    pub async fn list_mounts(&self) -> Result<Vec<String>> {
        Ok(parse_lines(&self.body(Command::new("listmounts")).await?))
    }

    pub async fn list_neighbors(&self) -> Result<Vec<String>> {
        Ok(parse_lines(&self.body(Command::new("listneighbors")).await?))
    }

    pub async fn stats(&self) -> Result<Stats> {
        let stats = parse_stats(&self.body(Command::new("stats")).await?);
        self.inner.state.lock().await.stats = stats.clone();
        Ok(stats)
    }

    /// Player status with the current song and replay gain mode
    pub async fn status(&self) -> Result<Status> {
        let mut list = CommandList::with_list_ok();
        list.push(Command::new("status"))
            .push(Command::new("currentsong"))
            .push(Command::new("replay_gain_status"));
        let status = parse_status(&self.body(list).await?);
        self.inner.state.lock().await.last_status = Some(status.clone());
        Ok(status)
    }

    pub async fn current_song(&self) -> Result<Option<Song>> {
        Ok(parse_current_song(
            &self.body(Command::new("currentsong")).await?,
        ))
    }

    /// Start a database update
    pub async fn update(&self) -> Result<()> {
        self.ok(Command::new("update")).await
    }

    /// Send a raw command line and return the reply lines
    pub async fn run_command(&self, line: &str) -> Result<Vec<String>> {
        Ok(parse_lines(&self.body(Command::raw(line)).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::connected;
    use crate::connection::MockTransport;
    use crate::core::PlayerState;

    #[tokio::test]
    async fn test_search_window_depends_on_version() {
        let mock = MockTransport::new();
        mock.reply_text("search", "file: a.mp3\nTitle: A\n");
        let client = connected(&mock).await;
        let songs = client.search("blue", Some((0, 50))).await.unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(
            mock.take_sent_commands(),
            vec!["search any \"blue\" window 0:50"]
        );

        let old = MockTransport::new();
        old.set_version("0.19.0");
        let client = connected(&old).await;
        client.search("blue", Some((0, 50))).await.unwrap();
        assert_eq!(old.take_sent_commands(), vec!["search any \"blue\""]);
    }

    #[tokio::test]
    async fn test_albums_use_requested_grouping() {
        let mock = MockTransport::new();
        mock.reply_text(
            "list album group albumartist",
            "AlbumArtist: Miles Davis\nAlbum: Kind of Blue\nAlbum: Bitches Brew\n",
        );
        let client = connected(&mock).await;
        let albums = client.albums(true, false).await.unwrap();
        let names: Vec<_> = albums.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Bitches Brew", "Kind of Blue"]);
        assert_eq!(albums[0].artist.as_deref(), Some("Miles Davis"));
    }

    #[tokio::test]
    async fn test_albums_for_artist_groups_by_date() {
        let mock = MockTransport::new();
        mock.reply_text(
            "list album artist \"Can\" group date",
            "Date: 1972\nAlbum: Ege Bamyasi\nDate: 1971\nAlbum: Tago Mago\n",
        );
        let client = connected(&mock).await;
        let albums = client.albums_for_artist("Can", true).await.unwrap();
        assert_eq!(albums[0].name, "Tago Mago");
        assert_eq!(albums[1].date.as_deref(), Some("1972"));
    }

    #[tokio::test]
    async fn test_songs_for_album_sorted_by_track() {
        let mock = MockTransport::new();
        mock.reply_text(
            "find album \"Blue Train\" artist \"John Coltrane\"",
            "file: b.flac\nTrack: 2\nfile: a.flac\nTrack: 1\n",
        );
        let client = connected(&mock).await;
        let songs = client
            .songs_for_album("Blue Train", Some("John Coltrane"))
            .await
            .unwrap();
        let files: Vec<_> = songs.iter().map(|s| s.file.as_str()).collect();
        assert_eq!(files, vec!["a.flac", "b.flac"]);
    }

    #[tokio::test]
    async fn test_songs_without_album_needs_filter_support() {
        let old = MockTransport::new();
        old.set_version("0.20.23");
        let client = connected(&old).await;
        assert_eq!(client.song_count_without_album("X").await.unwrap(), 0);
        assert!(client.songs_without_album("X").await.unwrap().is_empty());
        assert!(old.take_sent_commands().is_empty());

        let mock = MockTransport::new();
        mock.reply_text("count", "songs: 4\nplaytime: 800\n");
        let client = connected(&mock).await;
        assert_eq!(client.song_count_without_album("X").await.unwrap(), 4);
        assert_eq!(
            mock.take_sent_commands(),
            vec!["count \"((Artist == \\\"X\\\") AND (album == \\\"\\\"))\""]
        );
    }

    #[tokio::test]
    async fn test_list_files_decodes_uri_and_filters_suffixes() {
        let mock = MockTransport::new();
        mock.reply_text("decoders", "plugin: flac\nsuffix: flac\n");
        mock.reply_text(
            "lsinfo",
            "directory: Jazz/Live\nfile: Jazz/a.flac\nTitle: A\nfile: Jazz/cover.jpg\n",
        );
        let client = connected(&mock).await;
        let list = client.list_files(Some("Jazz%20Club"), false).await.unwrap();
        assert_eq!(mock.take_sent_commands(), vec!["lsinfo \"Jazz Club\""]);
        assert_eq!(list.dirs.len(), 1);
        assert_eq!(list.files.len(), 1);
        assert_eq!(list.files[0].file, "Jazz/a.flac");
    }

    #[tokio::test]
    async fn test_status_combines_sections() {
        let mock = MockTransport::new();
        mock.reply_text("status", "state: play\nvolume: 40\nrepeat: 1\n");
        mock.reply_text("currentsong", "file: a.mp3\nTitle: A\nId: 7\n");
        mock.reply_text("replay_gain_status", "replay_gain_mode: album\n");
        let client = connected(&mock).await;

        let status = client.status().await.unwrap();
        assert_eq!(status.state, PlayerState::Play);
        assert_eq!(status.volume, Some(40));
        assert!(status.repeat);
        assert_eq!(status.current_song.as_ref().unwrap().id, Some(7));
        assert_eq!(status.replay_gain_mode.as_deref(), Some("album"));
        assert_eq!(client.last_status().await, Some(status));
        assert_eq!(
            mock.take_sent_commands(),
            vec![
                "command_list_ok_begin",
                "status",
                "currentsong",
                "replay_gain_status",
                "command_list_end"
            ]
        );
    }

    #[tokio::test]
    async fn test_run_command_returns_lines() {
        let mock = MockTransport::new();
        mock.reply_text("listmounts", "mount: \nstorage: /music\n");
        let client = connected(&mock).await;
        assert_eq!(
            client.run_command("listmounts\n").await.unwrap(),
            vec!["mount:", "storage: /music"]
        );
    }
}
