use tracing::{info, warn};

use super::MpdClient;
use crate::core::{file_key, Song, Status};
use crate::error::{MpdError, Result};
use crate::protocol::{Command, CommandList};
use crate::storage::AutoplayRecord;

/// Stored playlist holding the queue while a "Play Now" song plays
pub const RESTORE_PLAYLIST: &str = "__playlist_to_restore";

fn flag(on: bool) -> u8 {
    u8::from(on)
}

impl MpdClient {
    /// The pending "Play Now" record, if any
    pub async fn autoplay_record(&self) -> Option<AutoplayRecord> {
        self.inner.state.lock().await.autoplay.clone()
    }

    pub(crate) async fn ensure_no_autoplay(&self) -> Result<()> {
        let state = self.inner.state.lock().await;
        if state.autoplay.is_some() || state.autoplay_starting {
            return Err(MpdError::AutoplayPending);
        }
        Ok(())
    }

    /// Pick up a record left behind by an earlier run
    pub(crate) async fn load_autoplay_record(&self) {
        let options = &self.inner.options;
        let Some(store) = &options.autoplay_store else {
            return;
        };
        match store.load(&options.host, options.port) {
            Ok(record) => {
                if record.is_some() {
                    info!("Resuming pending Play Now for {}:{}", options.host, options.port);
                }
                self.inner.state.lock().await.autoplay = record;
            }
            Err(e) => warn!("Could not load autoplay record: {:#}", e),
        }
    }

    fn persist_autoplay(&self, record: Option<&AutoplayRecord>) {
        let options = &self.inner.options;
        let Some(store) = &options.autoplay_store else {
            return;
        };
        let result = match record {
            Some(record) => store.save(&options.host, options.port, record),
            None => store.remove(&options.host, options.port),
        };
        if let Err(e) = result {
            warn!("Could not persist autoplay record: {:#}", e);
        }
    }

    /// Replace the queue with one song and remember how to undo it
    pub(crate) async fn play_now(&self, uri: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.autoplay.is_some() || state.autoplay_starting {
                return Err(MpdError::AutoplayPending);
            }
            state.autoplay_starting = true;
        }

        let result = self.start_autoplay(uri).await;

        let mut state = self.inner.state.lock().await;
        state.autoplay_starting = false;
        let record = result?;
        state.autoplay = Some(record.clone());
        drop(state);

        info!("Playing {} now", uri);
        self.persist_autoplay(Some(&record));
        Ok(())
    }

    async fn start_autoplay(&self, uri: &str) -> Result<AutoplayRecord> {
        let status = self.status().await?;
        let record = AutoplayRecord {
            song: file_key(uri),
            repeat: status.repeat,
            consume: status.consume,
            saved: status.playlist_length > 0,
        };

        let mut list = CommandList::new();
        if record.saved {
            list.push(Command::new("save").quoted(RESTORE_PLAYLIST));
        }
        list.push(Command::new("repeat").arg(0))
            .push(Command::new("consume").arg(0))
            .push(Command::new("clear"))
            .push(Command::new("add").quoted(uri))
            .push(Command::new("play"));
        self.ok(list).await?;
        Ok(record)
    }

    /// Restore the queue once the current song is no longer the "Play Now"
    /// song. Returns true when a restore happened.
    pub(crate) async fn finish_autoplay_if_done(
        &self,
        record: &AutoplayRecord,
        status: &Status,
    ) -> bool {
        let current = status.current_song.as_ref().map(Song::file_key);
        if current.as_deref() == Some(record.song.as_str()) {
            return false;
        }

        {
            let mut state = self.inner.state.lock().await;
            // another poll may have restored it already
            if state.autoplay.as_ref() != Some(record) {
                return false;
            }
            state.autoplay = None;
        }

        info!("Play Now finished, restoring the previous queue");
        let mut list = CommandList::new();
        list.push(Command::new("clear"));
        if record.saved {
            list.push(Command::new("load").quoted(RESTORE_PLAYLIST))
                .push(Command::new("rm").quoted(RESTORE_PLAYLIST));
        }
        list.push(Command::new("repeat").arg(flag(record.repeat)))
            .push(Command::new("consume").arg(flag(record.consume)));
        if let Err(e) = self.ok(list).await {
            warn!("Restoring the queue failed: {}", e);
        }

        self.persist_autoplay(None);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{connected, connected_with, options};
    use super::super::ClientEvent;
    use super::*;
    use crate::connection::{MockReply, MockTransport};
    use crate::storage::AutoplayStore;

    fn playing(file: &str) -> String {
        format!("file: {}\nTitle: T\n", file)
    }

    #[tokio::test]
    async fn test_play_now_saves_and_restores_queue() {
        let mock = MockTransport::new();
        mock.reply_text("status", "repeat: 1\nconsume: 1\nplaylistlength: 5\nstate: play\n");
        // replies are used in order: Play Now's status, then two polls
        mock.reply_text("currentsong", &playing("old.mp3"));
        mock.reply_text("currentsong", &playing("new song.mp3"));
        mock.reply_text("currentsong", "");
        let client = connected(&mock).await;
        let mut events = client.subscribe();

        client.add_song("new song.mp3", true).await.unwrap();
        let record = client.autoplay_record().await.unwrap();
        assert_eq!(record.song, file_key("new song.mp3"));
        assert!(record.repeat && record.consume && record.saved);
        let sent = mock.take_sent_commands();
        assert_eq!(
            &sent[sent.len() - 8..],
            &[
                "command_list_begin",
                "save \"__playlist_to_restore\"",
                "repeat 0",
                "consume 0",
                "clear",
                "add \"new song.mp3\"",
                "play",
                "command_list_end"
            ]
        );

        // still on the Play Now song: nothing happens
        let status = client.poll_status().await.unwrap();
        assert!(!status.reload_queue);
        assert!(client.autoplay_record().await.is_some());

        // the song ended
        mock.take_sent_commands();
        let status = client.poll_status().await.unwrap();
        assert!(status.reload_queue);
        assert!(client.autoplay_record().await.is_none());
        let sent = mock.take_sent_commands();
        assert_eq!(
            &sent[sent.len() - 7..],
            &[
                "command_list_begin",
                "clear",
                "load \"__playlist_to_restore\"",
                "rm \"__playlist_to_restore\"",
                "repeat 1",
                "consume 1",
                "command_list_end"
            ]
        );

        let mut saw_reload = false;
        while let Ok(event) = events.try_recv() {
            if let ClientEvent::Status(status) = event {
                saw_reload |= status.reload_queue;
            }
        }
        assert!(saw_reload);
    }

    #[tokio::test]
    async fn test_play_now_on_empty_queue_skips_save() {
        let mock = MockTransport::new();
        mock.reply_text("status", "playlistlength: 0\n");
        let client = connected(&mock).await;
        client.add_song("a.mp3", true).await.unwrap();
        let sent = mock.take_sent_commands();
        assert!(!sent.iter().any(|c| c.starts_with("save")));
        assert!(!client.autoplay_record().await.unwrap().saved);

        assert!(matches!(
            client.add_song("b.mp3", true).await,
            Err(MpdError::AutoplayPending)
        ));
    }

    #[tokio::test]
    async fn test_failed_play_now_leaves_no_record() {
        let mock = MockTransport::new();
        mock.reply_text("status", "playlistlength: 2\n");
        mock.reply(
            "save",
            MockReply::Ack("ACK [56@0] {save} Playlist already exists".to_string()),
        );
        let client = connected(&mock).await;
        assert!(matches!(
            client.add_song("a.mp3", true).await,
            Err(MpdError::Ack(_))
        ));
        assert!(client.autoplay_record().await.is_none());
        client.ensure_no_autoplay().await.unwrap();
    }

    #[tokio::test]
    async fn test_record_survives_reconnect_of_process() {
        let dir = tempfile::tempdir().unwrap();
        let store = AutoplayStore::new(dir.path());

        let mock = MockTransport::new();
        let client = connected_with(&mock, options().with_autoplay_store(store.clone())).await;
        client.add_song("a.mp3", true).await.unwrap();
        client.disconnect().await;
        assert!(store.load("localhost", 6600).unwrap().is_some());

        let client = connected_with(&mock, options().with_autoplay_store(store.clone())).await;
        assert_eq!(
            client.autoplay_record().await.map(|r| r.song),
            Some(file_key("a.mp3"))
        );

        // nothing is playing any more
        client.poll_status().await.unwrap();
        assert!(store.load("localhost", 6600).unwrap().is_none());
    }
}
