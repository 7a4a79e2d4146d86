use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::MpdClient;
use crate::core::{Output, PlayerState};
use crate::error::Result;
use crate::playback::{NowPlayingInfo, PlaybackSession, PlaybackState, RemoteCommand, SessionEvent};
use crate::protocol::parse::parse_outputs;
use crate::protocol::Command;

fn flag(on: bool) -> u8 {
    u8::from(on)
}

impl MpdClient {
    /// The attached session, if now-playing control is enabled
    fn session(&self) -> Option<PlaybackSession> {
        if !self.inner.options.use_now_playing_control {
            return None;
        }
        self.inner.session.lock().ok().and_then(|s| s.clone())
    }

    /// Enable the attached session and route its remote commands here
    pub(crate) fn start_session(&self) {
        let Some(session) = self.session() else {
            return;
        };
        session.start();

        let mut remote = session.subscribe();
        let weak = self.downgrade();
        let task = tokio::spawn(async move {
            loop {
                match remote.recv().await {
                    Ok(SessionEvent::Remote(command)) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        let client = MpdClient::from_inner(inner);
                        if let Err(e) = client.handle_remote(command).await {
                            warn!("Remote {} failed: {}", command, e);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} session events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.track(task);
    }

    pub(crate) fn stop_session(&self) {
        if let Some(session) = self.session() {
            session.stop();
        }
    }

    /// Run a remote control request against the server
    pub async fn handle_remote(&self, command: RemoteCommand) -> Result<()> {
        debug!("Remote {}", command);
        match command {
            RemoteCommand::Play => self.play_inner(None, true).await,
            RemoteCommand::Pause => self.pause_inner(true).await,
            RemoteCommand::Stop => self.stop().await,
            RemoteCommand::Previous => self.previous().await,
            RemoteCommand::Next => self.next().await,
            RemoteCommand::PlayPause => {
                let state = self.last_status().await.map(|s| s.state);
                match state {
                    Some(PlayerState::Play) => self.pause_inner(true).await,
                    Some(PlayerState::Pause) => self.play_inner(None, true).await,
                    _ => Ok(()),
                }
            }
        }
    }

    /// Push now-playing info built from the last status
    async fn publish_now_playing(&self, state: PlaybackState) {
        let Some(session) = self.session() else {
            return;
        };
        let status = self.last_status().await;
        session.set_now_playing(NowPlayingInfo::from_status(state, status.as_ref()));
    }

    /// Play the song with `song_id`, or resume
    pub async fn play(&self, song_id: Option<u32>) -> Result<()> {
        self.play_inner(song_id, false).await
    }

    async fn play_inner(&self, song_id: Option<u32>, remote: bool) -> Result<()> {
        let cmd = match song_id {
            Some(id) => Command::new("playid").arg(id),
            None => Command::new("play"),
        };
        self.ok(cmd).await?;
        self.publish_now_playing(PlaybackState::Playing).await;
        if !remote {
            if let Some(session) = self.session() {
                session.play_silence();
            }
        }
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.pause_inner(false).await
    }

    async fn pause_inner(&self, remote: bool) -> Result<()> {
        self.ok(Command::new("pause")).await?;
        self.publish_now_playing(PlaybackState::Paused).await;
        if !remote {
            if let Some(session) = self.session() {
                session.pause_silence();
            }
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.ok(Command::new("stop")).await?;
        self.publish_now_playing(PlaybackState::Stopped).await;
        Ok(())
    }

    pub async fn next(&self) -> Result<()> {
        self.ok(Command::new("next")).await?;
        self.publish_now_playing(PlaybackState::Playing).await;
        Ok(())
    }

    pub async fn previous(&self) -> Result<()> {
        self.ok(Command::new("previous")).await?;
        self.publish_now_playing(PlaybackState::Playing).await;
        Ok(())
    }

    /// Volume in percent (0-100)
    ///
    /// With `use_device_volume` and an attached session the device volume
    /// changes and the server's stays as it is.
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        let volume = volume.min(100);
        if self.inner.options.use_device_volume {
            let session = self.inner.session.lock().ok().and_then(|s| s.clone());
            if let Some(session) = session {
                session.set_volume(volume);
                return Ok(());
            }
            debug!("No session attached, setting the server volume");
        }
        self.ok(Command::new("setvol").arg(volume)).await
    }

    /// Seek within the current song, in seconds
    pub async fn seek_current(&self, seconds: f64) -> Result<()> {
        self.ok(Command::new("seekcur").arg(seconds)).await
    }

    pub async fn shuffle(&self, on: bool) -> Result<()> {
        self.ok(Command::new("random").arg(flag(on))).await
    }

    pub async fn repeat(&self, on: bool) -> Result<()> {
        self.ok(Command::new("repeat").arg(flag(on))).await
    }

    pub async fn consume(&self, on: bool) -> Result<()> {
        self.ok(Command::new("consume").arg(flag(on))).await
    }

    pub async fn single(&self, on: bool) -> Result<()> {
        self.ok(Command::new("single").arg(flag(on))).await
    }

    pub async fn crossfade(&self, seconds: u32) -> Result<()> {
        self.ok(Command::new("crossfade").arg(seconds)).await
    }

    /// `off`, `track`, `album` or `auto`
    pub async fn replay_gain_mode(&self, mode: &str) -> Result<()> {
        self.ok(Command::new("replay_gain_mode").arg(mode)).await
    }

    pub async fn outputs(&self) -> Result<Vec<Output>> {
        Ok(parse_outputs(&self.body(Command::new("outputs")).await?))
    }

    pub async fn enable_output(&self, id: &str) -> Result<()> {
        self.ok(Command::new("enableoutput").arg(id)).await
    }

    pub async fn disable_output(&self, id: &str) -> Result<()> {
        self.ok(Command::new("disableoutput").arg(id)).await
    }
}
