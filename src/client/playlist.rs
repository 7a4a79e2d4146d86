use rand::seq::index;
use tracing::{debug, info};

use super::MpdClient;
use crate::core::Song;
use crate::error::Result;
use crate::protocol::parse::{is_playlist_file, parse_file_uris, parse_playlists, parse_songs};
use crate::protocol::{Command, CommandList};

/// Above `size + RANDOM_SLACK` candidates a random playlist is sampled;
/// otherwise the first `size` are used as they come.
const RANDOM_SLACK: usize = 10;

/// `add` for every file, wrapped in clear/play for autoplay
fn add_list<I, S>(files: I, autoplay: bool) -> CommandList
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut list = CommandList::new();
    if autoplay {
        list.push(Command::new("clear"));
    }
    list.extend(
        files
            .into_iter()
            .map(|file| Command::new("add").quoted(file.as_ref())),
    );
    if autoplay {
        list.push(Command::new("play"));
    }
    list
}

fn playlist_add_list<I, S>(files: I, playlist: &str) -> CommandList
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut list = CommandList::new();
    list.extend(files.into_iter().map(|file| {
        Command::new("playlistadd")
            .quoted(playlist)
            .quoted(file.as_ref())
    }));
    list
}

/// Keep `size` of the candidates, sampling without repeats when there are
/// plenty to choose from
fn pick_random(mut candidates: Vec<String>, size: usize) -> Vec<String> {
    if candidates.len() > size + RANDOM_SLACK {
        let mut rng = rand::thread_rng();
        return index::sample(&mut rng, candidates.len(), size)
            .into_iter()
            .map(|i| std::mem::take(&mut candidates[i]))
            .collect();
    }
    candidates.truncate(size);
    candidates
}

impl MpdClient {
    async fn send_list(&self, list: CommandList) -> Result<()> {
        if list.is_empty() {
            return Ok(());
        }
        self.ok(list).await
    }

    pub async fn queue(&self) -> Result<Vec<Song>> {
        self.playlist_info(None).await
    }

    /// Songs of a stored playlist, or of the queue when `name` is `None`
    pub async fn playlist_info(&self, name: Option<&str>) -> Result<Vec<Song>> {
        let cmd = match name {
            Some(name) => Command::new("listplaylistinfo").quoted(name),
            None => Command::new("playlistinfo"),
        };
        Ok(parse_songs(&self.body(cmd).await?))
    }

    pub async fn add_album(&self, album: &str, artist: Option<&str>, autoplay: bool) -> Result<()> {
        if autoplay {
            self.ensure_no_autoplay().await?;
        }
        let songs = self.songs_for_album(album, artist).await?;
        self.send_list(add_list(songs.iter().map(|s| &s.file), autoplay))
            .await
    }

    pub async fn add_album_to_playlist(
        &self,
        album: &str,
        artist: Option<&str>,
        playlist: &str,
    ) -> Result<()> {
        let songs = self.songs_for_album(album, artist).await?;
        self.send_list(playlist_add_list(songs.iter().map(|s| &s.file), playlist))
            .await
    }

    pub async fn add_genre(&self, genre: &str, autoplay: bool) -> Result<()> {
        if autoplay {
            self.ensure_no_autoplay().await?;
        }
        let songs = self.songs_for_genre(genre).await?;
        self.send_list(add_list(songs.iter().map(|s| &s.file), autoplay))
            .await
    }

    pub async fn add_genre_to_playlist(&self, genre: &str, playlist: &str) -> Result<()> {
        let songs = self.songs_for_genre(genre).await?;
        self.send_list(playlist_add_list(songs.iter().map(|s| &s.file), playlist))
            .await
    }

    /// Append one song, or with `autoplay` play it right away and bring the
    /// old queue back once it is over
    pub async fn add_song(&self, uri: &str, autoplay: bool) -> Result<()> {
        if autoplay {
            return self.play_now(uri).await;
        }
        self.ok(Command::new("add").quoted(uri)).await
    }

    pub async fn add_song_to_playlist(&self, uri: &str, playlist: &str) -> Result<()> {
        self.ok(Command::new("playlistadd").quoted(playlist).quoted(uri))
            .await
    }

    pub async fn add_songs(&self, uris: &[String], autoplay: bool) -> Result<()> {
        if autoplay {
            self.ensure_no_autoplay().await?;
        }
        self.send_list(add_list(uris, autoplay)).await
    }

    pub async fn add_songs_to_playlist(&self, uris: &[String], playlist: &str) -> Result<()> {
        self.send_list(playlist_add_list(uris, playlist)).await
    }

    /// Songs of a directory, skipping playlist files
    async fn directory_songs(&self, dir: &str) -> Result<Vec<String>> {
        let list = self.list_files(Some(dir), false).await?;
        Ok(list
            .files
            .into_iter()
            .map(|entry| entry.file)
            .filter(|file| !is_playlist_file(file))
            .collect())
    }

    pub async fn add_directory(&self, dir: &str, autoplay: bool) -> Result<()> {
        if autoplay {
            self.ensure_no_autoplay().await?;
        }
        let files = self.directory_songs(dir).await?;
        self.send_list(add_list(files, autoplay)).await
    }

    pub async fn add_directory_to_playlist(&self, dir: &str, playlist: &str) -> Result<()> {
        let files = self.directory_songs(dir).await?;
        self.send_list(playlist_add_list(files, playlist)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.ok(Command::new("clear")).await
    }

    /// Remove a queue entry by song id
    pub async fn remove_song(&self, id: u32) -> Result<()> {
        self.ok(Command::new("deleteid").arg(id)).await
    }

    pub async fn list_playlists(&self) -> Result<Vec<String>> {
        Ok(parse_playlists(
            &self.body(Command::new("listplaylists")).await?,
        ))
    }

    /// Append a stored playlist, or with `autoplay` replace the queue with it and play
    pub async fn load_playlist(&self, name: &str, autoplay: bool) -> Result<()> {
        if autoplay {
            self.ensure_no_autoplay().await?;
            let mut list = CommandList::new();
            list.push(Command::new("clear"))
                .push(Command::new("load").quoted(name))
                .push(Command::new("play"));
            self.ok(list).await?;
        } else {
            self.ok(Command::new("load").quoted(name)).await?;
        }
        self.set_current_playlist_name(Some(name.to_string())).await;
        Ok(())
    }

    /// Append every queued song to the stored playlist `name`
    pub async fn save_playlist(&self, name: &str) -> Result<()> {
        let songs = self.queue().await?;
        debug!("Saving {} songs to {}", songs.len(), name);
        self.send_list(playlist_add_list(songs.iter().map(|s| &s.file), name))
            .await?;
        self.set_current_playlist_name(Some(name.to_string())).await;
        Ok(())
    }

    pub async fn delete_playlist(&self, name: &str) -> Result<()> {
        self.ok(Command::new("rm").quoted(name)).await?;
        let mut state = self.inner.state.lock().await;
        if state.current_playlist_name.as_deref() == Some(name) {
            state.current_playlist_name = None;
        }
        Ok(())
    }

    pub async fn delete_playlist_item(&self, name: &str, position: u32) -> Result<()> {
        self.ok(Command::new("playlistdelete").quoted(name).arg(position))
            .await
    }

    /// Swap two queue entries by song id
    pub async fn swap(&self, id1: u32, id2: u32) -> Result<()> {
        self.ok(Command::new("swapid").arg(id1).arg(id2)).await
    }

    /// Move a queue entry (by song id) to a position
    pub async fn move_song(&self, id: u32, to: u32) -> Result<()> {
        self.ok(Command::new("moveid").arg(id).arg(to)).await
    }

    /// Name of the stored playlist the queue was last loaded from or saved to
    pub async fn current_playlist_name(&self) -> Option<String> {
        self.inner.state.lock().await.current_playlist_name.clone()
    }

    pub async fn set_current_playlist_name(&self, name: Option<String>) {
        self.inner.state.lock().await.current_playlist_name = name;
    }

    /// Append up to `size` random songs. `tag_filter` is a tag and a
    /// `+`-separated list of values to draw from, e.g. `("genre", "Jazz+Soul")`.
    /// Returns how many songs were added.
    pub async fn random_playlist(&self, size: usize, tag_filter: Option<(&str, &str)>) -> Result<usize> {
        let candidates = match tag_filter {
            Some((tag, values)) => self.random_candidates_by_tag(tag, values).await?,
            None if self.version().supports_windowed_random() => {
                self.random_window_candidates(size).await?
            }
            None => parse_file_uris(
                &self
                    .body(Command::new("search").arg("title").quoted(""))
                    .await?,
            ),
        };

        let songs = pick_random(candidates, size);
        info!("Adding {} random songs", songs.len());
        self.add_songs(&songs, false).await?;
        Ok(songs.len())
    }

    async fn random_candidates_by_tag(&self, tag: &str, values: &str) -> Result<Vec<String>> {
        let mut list = CommandList::new();
        list.extend(
            values
                .split('+')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|value| Command::new("search").arg(tag).quoted(value)),
        );
        if list.is_empty() {
            return Ok(Vec::new());
        }
        Ok(parse_file_uris(&self.body(list).await?))
    }

    /// One single-song window search per randomly chosen library index
    async fn random_window_candidates(&self, size: usize) -> Result<Vec<String>> {
        let mut total = self.inner.state.lock().await.stats.songs as usize;
        if total == 0 {
            total = self.stats().await?.songs as usize;
        }
        if total == 0 {
            return Ok(Vec::new());
        }

        let indexes = {
            let mut rng = rand::thread_rng();
            index::sample(&mut rng, total, size.min(total)).into_vec()
        };
        let mut list = CommandList::new();
        list.extend(indexes.into_iter().map(|i| {
            Command::new("search")
                .arg("title")
                .quoted("")
                .arg("window")
                .arg(format!("{}:{}", i, i + 1))
        }));
        Ok(parse_file_uris(&self.body(list).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::connected;
    use super::*;
    use crate::connection::MockTransport;
    use crate::error::MpdError;

    #[test]
    fn test_pick_random_samples_only_large_pools() {
        let few: Vec<String> = (0..15).map(|i| i.to_string()).collect();
        assert_eq!(pick_random(few.clone(), 5), few[..5].to_vec());

        let many: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        let mut picked = pick_random(many, 5);
        assert_eq!(picked.len(), 5);
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 5);
    }

    #[tokio::test]
    async fn test_add_album_with_autoplay() {
        let mock = MockTransport::new();
        mock.reply_text(
            "find album \"Giant Steps\"",
            "file: 2.flac\nTrack: 2\nfile: 1.flac\nTrack: 1\n",
        );
        let client = connected(&mock).await;
        client.add_album("Giant Steps", None, true).await.unwrap();
        assert_eq!(
            mock.take_sent_commands(),
            vec![
                "find album \"Giant Steps\"",
                "command_list_begin",
                "clear",
                "add \"1.flac\"",
                "add \"2.flac\"",
                "play",
                "command_list_end"
            ]
        );
    }

    #[tokio::test]
    async fn test_add_directory_skips_playlists() {
        let mock = MockTransport::new();
        mock.reply_text(
            "lsinfo",
            "file: d/b.mp3\nplaylist: d/list.m3u\nfile: d/a.mp3\nplaylist: d/set.cue\n",
        );
        let client = connected(&mock).await;
        client.add_directory_to_playlist("d", "mix").await.unwrap();
        let sent = mock.take_sent_commands();
        assert_eq!(
            &sent[1..],
            &[
                "command_list_begin",
                "playlistadd \"mix\" \"d/a.mp3\"",
                "playlistadd \"mix\" \"d/b.mp3\"",
                "command_list_end"
            ]
        );
    }

    #[tokio::test]
    async fn test_save_playlist_copies_queue() {
        let mock = MockTransport::new();
        mock.reply_text("playlistinfo", "file: a.mp3\nPos: 0\nfile: b.mp3\nPos: 1\n");
        let client = connected(&mock).await;
        client.save_playlist("evening").await.unwrap();
        assert_eq!(
            mock.take_sent_commands(),
            vec![
                "playlistinfo",
                "command_list_begin",
                "playlistadd \"evening\" \"a.mp3\"",
                "playlistadd \"evening\" \"b.mp3\"",
                "command_list_end"
            ]
        );
        assert_eq!(
            client.current_playlist_name().await.as_deref(),
            Some("evening")
        );

        client.delete_playlist("evening").await.unwrap();
        assert_eq!(client.current_playlist_name().await, None);
    }

    #[tokio::test]
    async fn test_load_playlist_autoplay_replaces_queue() {
        let mock = MockTransport::new();
        let client = connected(&mock).await;
        client.load_playlist("morning", true).await.unwrap();
        assert_eq!(
            mock.take_sent_commands(),
            vec![
                "command_list_begin",
                "clear",
                "load \"morning\"",
                "play",
                "command_list_end"
            ]
        );
    }

    #[tokio::test]
    async fn test_queue_edits() {
        let mock = MockTransport::new();
        let client = connected(&mock).await;
        client.remove_song(4).await.unwrap();
        client.swap(1, 2).await.unwrap();
        client.move_song(3, 0).await.unwrap();
        client.delete_playlist_item("mix", 7).await.unwrap();
        assert_eq!(
            mock.take_sent_commands(),
            vec![
                "deleteid 4",
                "swapid 1 2",
                "moveid 3 0",
                "playlistdelete \"mix\" 7"
            ]
        );
    }

    #[tokio::test]
    async fn test_random_playlist_by_tag() {
        let mock = MockTransport::new();
        mock.reply_text("search genre \"Jazz\"", "file: j1.mp3\nfile: j2.mp3\n");
        mock.reply_text("search genre \"Soul\"", "file: s1.mp3\n");
        let client = connected(&mock).await;

        let added = client
            .random_playlist(10, Some(("genre", "Jazz+Soul")))
            .await
            .unwrap();
        assert_eq!(added, 3);
        let sent = mock.take_sent_commands();
        assert!(sent.contains(&"add \"s1.mp3\"".to_string()));
        assert_eq!(sent.iter().filter(|c| c.starts_with("add ")).count(), 3);
    }

    #[tokio::test]
    async fn test_random_playlist_uses_windows() {
        let mock = MockTransport::new();
        mock.reply_text("stats", "songs: 3\n");
        mock.reply_text("search", "file: x.mp3\n");
        let client = connected(&mock).await;

        let added = client.random_playlist(2, None).await.unwrap();
        assert_eq!(added, 2);
        let sent = mock.take_sent_commands();
        let windows: Vec<_> = sent.iter().filter(|c| c.contains(" window ")).collect();
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|c| c.starts_with("search title \"\" window ")));
    }

    #[tokio::test]
    async fn test_random_playlist_on_old_server() {
        let mock = MockTransport::new();
        mock.set_version("0.19.21");
        mock.reply_text("search title \"\"", "file: a.mp3\nfile: b.mp3\n");
        let client = connected(&mock).await;
        assert_eq!(client.random_playlist(5, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_autoplay_entry_points_reject_while_pending() {
        let mock = MockTransport::new();
        let client = connected(&mock).await;
        client.add_song("a.mp3", true).await.unwrap();
        mock.take_sent_commands();

        assert!(matches!(
            client.add_genre("Jazz", true).await,
            Err(MpdError::AutoplayPending)
        ));
        assert!(matches!(
            client.load_playlist("x", true).await,
            Err(MpdError::AutoplayPending)
        ));
        assert!(matches!(
            client.add_songs(&["b.mp3".to_string()], true).await,
            Err(MpdError::AutoplayPending)
        ));
        assert!(mock.take_sent_commands().is_empty());

        // plain appends still work
        client.add_song("b.mp3", false).await.unwrap();
    }
}
