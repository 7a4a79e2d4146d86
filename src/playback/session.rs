use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

use super::player::{PlayerItem, PlayerLooper, QueuePlayer};
use super::{NowPlayingInfo, PlaybackState, RemoteCommand, SessionEvent};

const EVENT_CAPACITY: usize = 64;

struct SessionState {
    player: QueuePlayer,
    looper: Option<PlayerLooper>,
    is_playing: bool,
    remote_enabled: bool,
    now_playing: NowPlayingInfo,
    /// When `now_playing` was last set, for elapsed extrapolation
    updated_at: Option<Instant>,
    volume: u8,
}

/// Host-facing playback controller
///
/// Keeps a silent looping item playing so the host keeps its media
/// session, publishes now-playing information, and turns remote control
/// requests into events. Clones share the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SessionState {
                player: QueuePlayer::new(),
                looper: None,
                is_playing: false,
                remote_enabled: false,
                now_playing: NowPlayingInfo::default(),
                updated_at: None,
                volume: 100,
            })),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Enable remote commands
    pub fn start(&self) {
        self.lock().remote_enabled = true;
        debug!("Playback session started");
    }

    /// Disable remote commands and stop the player
    pub fn stop(&self) {
        let was_playing = {
            let mut state = self.lock();
            state.remote_enabled = false;
            state.player.stop();
            state.looper = None;
            std::mem::replace(&mut state.is_playing, false)
        };
        if was_playing {
            self.emit(SessionEvent::StateChanged { playing: false });
        }
        debug!("Playback session stopped");
    }

    pub fn is_started(&self) -> bool {
        self.lock().remote_enabled
    }

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing
    }

    pub fn player_state(&self) -> PlaybackState {
        self.lock().player.state()
    }

    /// Start the silent loop, installing it on first use
    pub fn play_silence(&self) {
        let changed = {
            let mut state = self.lock();
            if state.looper.is_none() {
                state.looper = Some(PlayerLooper::new(PlayerItem::silence()));
            }
            if state.player.is_empty() {
                state.player.enqueue(PlayerItem::silence());
            }
            state.player.play();
            !std::mem::replace(&mut state.is_playing, true)
        };
        if changed {
            self.emit(SessionEvent::StateChanged { playing: true });
        }
    }

    pub fn pause_silence(&self) {
        let changed = {
            let mut state = self.lock();
            state.player.pause();
            std::mem::replace(&mut state.is_playing, false)
        };
        if changed {
            self.emit(SessionEvent::StateChanged { playing: false });
        }
    }

    pub fn set_now_playing(&self, info: NowPlayingInfo) {
        {
            let mut state = self.lock();
            state.now_playing = info.clone();
            state.updated_at = Some(Instant::now());
        }
        self.emit(SessionEvent::NowPlayingChanged(info));
    }

    pub fn now_playing(&self) -> NowPlayingInfo {
        self.lock().now_playing.clone()
    }

    pub fn volume(&self) -> u8 {
        self.lock().volume
    }

    /// Set the device volume (0-100)
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        let changed = std::mem::replace(&mut self.lock().volume, volume) != volume;
        if changed {
            self.emit(SessionEvent::VolumeChanged(volume));
        }
    }

    /// Elapsed seconds, extrapolated from the last update while playing
    pub fn elapsed(&self) -> u64 {
        let state = self.lock();
        let info = &state.now_playing;
        if info.state != PlaybackState::Playing {
            return info.elapsed;
        }
        let since = state
            .updated_at
            .map(|at| at.elapsed().as_secs())
            .unwrap_or(0);
        let elapsed = info.elapsed + since;
        if info.duration > 0 {
            elapsed.min(info.duration)
        } else {
            elapsed
        }
    }

    /// Relay a remote command. Ignored unless the session is started.
    pub fn handle_remote(&self, command: RemoteCommand) -> bool {
        if !self.is_started() {
            debug!("Ignoring remote {} while session is stopped", command);
            return false;
        }
        self.emit(SessionEvent::Remote(command));
        true
    }

    /// Advance the silent player
    pub fn update(&self, delta: Duration) {
        let mut state = self.lock();
        let SessionState { player, looper, .. } = &mut *state;
        player.update(delta, looper.as_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remote_commands_need_start() {
        let session = PlaybackSession::new();
        let mut events = session.subscribe();

        assert!(!session.handle_remote(RemoteCommand::Next));
        session.start();
        assert!(session.handle_remote(RemoteCommand::Next));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Remote(RemoteCommand::Next)
        );

        session.stop();
        assert!(!session.handle_remote(RemoteCommand::Play));
    }

    #[tokio::test]
    async fn test_silence_toggles_playing() {
        let session = PlaybackSession::new();
        let mut events = session.subscribe();

        session.play_silence();
        assert!(session.is_playing());
        assert_eq!(session.player_state(), PlaybackState::Playing);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged { playing: true }
        );

        // the looper keeps the player alive past the first item
        session.update(Duration::from_secs(5));
        assert_eq!(session.player_state(), PlaybackState::Playing);

        session.play_silence();
        session.pause_silence();
        assert!(!session.is_playing());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged { playing: false }
        );
    }

    #[tokio::test]
    async fn test_device_volume_is_clamped() {
        let session = PlaybackSession::new();
        let mut events = session.subscribe();
        assert_eq!(session.volume(), 100);

        session.set_volume(150);
        session.set_volume(40);
        assert_eq!(session.volume(), 40);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::VolumeChanged(40));
    }

    #[test]
    fn test_elapsed_is_frozen_when_paused() {
        let session = PlaybackSession::new();
        session.set_now_playing(NowPlayingInfo {
            state: PlaybackState::Paused,
            elapsed: 42,
            duration: 100,
            ..Default::default()
        });
        assert_eq!(session.elapsed(), 42);

        session.set_now_playing(NowPlayingInfo {
            state: PlaybackState::Playing,
            elapsed: 100,
            duration: 100,
            ..Default::default()
        });
        assert_eq!(session.elapsed(), 100);
    }
}
