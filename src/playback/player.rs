use std::collections::VecDeque;
use std::time::Duration;

use super::PlaybackState;

/// One item a queue player can play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerItem {
    pub name: String,
    pub duration: Duration,
}

impl PlayerItem {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }

    /// One second of silence, used to keep the host audio session alive
    pub fn silence() -> Self {
        Self::new("silence", Duration::from_secs(1))
    }
}

/// Re-enqueues a template item every time the player runs dry
#[derive(Debug, Clone)]
pub struct PlayerLooper {
    template: PlayerItem,
    loops: u64,
}

impl PlayerLooper {
    pub fn new(template: PlayerItem) -> Self {
        Self { template, loops: 0 }
    }

    pub fn template(&self) -> &PlayerItem {
        &self.template
    }

    /// Number of times the template has been re-enqueued
    pub fn loop_count(&self) -> u64 {
        self.loops
    }

    fn next_item(&mut self) -> PlayerItem {
        self.loops += 1;
        self.template.clone()
    }
}

/// Plays a queue of items in order
#[derive(Debug, Default)]
pub struct QueuePlayer {
    items: VecDeque<PlayerItem>,
    state: PlaybackState,
    /// Position inside the head item
    position: Duration,
    finished: u64,
}

impl QueuePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: PlayerItem) {
        self.items.push_back(item);
    }

    pub fn current(&self) -> Option<&PlayerItem> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    /// Items played to the end so far
    pub fn finished_count(&self) -> u64 {
        self.finished
    }

    /// Start or resume. Nothing happens with an empty queue.
    pub fn play(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Stop and drop every item
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.items.clear();
        self.position = Duration::ZERO;
    }

    pub fn seek(&mut self, position: Duration) {
        if let Some(item) = self.items.front() {
            self.position = position.min(item.duration);
        }
    }

    /// Skip to the next item
    pub fn advance(&mut self, looper: Option<&mut PlayerLooper>) {
        self.items.pop_front();
        self.position = Duration::ZERO;
        if self.items.is_empty() {
            match looper {
                Some(looper) => self.items.push_back(looper.next_item()),
                None => self.state = PlaybackState::Stopped,
            }
        }
    }

    /// Advance playback time (call periodically)
    pub fn update(&mut self, delta: Duration, mut looper: Option<&mut PlayerLooper>) {
        if self.state != PlaybackState::Playing {
            return;
        }

        let mut remaining = delta;
        while let Some(item) = self.items.front() {
            let left = item.duration.saturating_sub(self.position);
            if remaining < left {
                self.position += remaining;
                return;
            }
            remaining -= left;
            self.finished += 1;
            self.advance(looper.as_deref_mut());
            if self.state != PlaybackState::Playing || item_is_zero(self.items.front()) {
                return;
            }
        }
    }
}

fn item_is_zero(item: Option<&PlayerItem>) -> bool {
    item.map_or(true, |i| i.duration.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_plays_in_order_and_stops() {
        let mut player = QueuePlayer::new();
        player.enqueue(PlayerItem::new("a", Duration::from_secs(2)));
        player.enqueue(PlayerItem::new("b", Duration::from_secs(3)));
        player.play();

        player.update(Duration::from_secs(1), None);
        assert_eq!(player.current().unwrap().name, "a");
        assert_eq!(player.position(), Duration::from_secs(1));

        player.update(Duration::from_secs(2), None);
        assert_eq!(player.current().unwrap().name, "b");
        assert_eq!(player.position(), Duration::from_secs(1));

        player.update(Duration::from_secs(5), None);
        assert!(player.is_empty());
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.finished_count(), 2);
    }

    #[test]
    fn test_looper_keeps_playing() {
        let mut player = QueuePlayer::new();
        let mut looper = PlayerLooper::new(PlayerItem::silence());
        player.enqueue(PlayerItem::silence());
        player.play();

        player.update(Duration::from_millis(3500), Some(&mut looper));
        assert!(player.is_playing());
        assert_eq!(looper.loop_count(), 3);
        assert_eq!(player.position(), Duration::from_millis(500));
    }

    #[test]
    fn test_pause_freezes_position() {
        let mut player = QueuePlayer::new();
        player.play();
        assert_eq!(player.state(), PlaybackState::Stopped);

        player.enqueue(PlayerItem::new("a", Duration::from_secs(10)));
        player.play();
        player.update(Duration::from_secs(2), None);
        player.pause();
        player.update(Duration::from_secs(5), None);
        assert_eq!(player.position(), Duration::from_secs(2));

        player.seek(Duration::from_secs(60));
        assert_eq!(player.position(), Duration::from_secs(10));

        player.stop();
        assert!(player.is_empty());
    }
}
