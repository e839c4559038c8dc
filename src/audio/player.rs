use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        events::{PlaybackEvent, PlaybackEventKind},
        queue::{Advance, Enqueued, GuildQueue, PlaybackTicket, SessionTarget},
    },
    error::BotError,
    sources::Track,
};

/// Voice transport plus audio player for one guild at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Joins (or reuses) the voice connection and starts streaming `track`.
    /// Lifecycle events for it must be tagged with `ticket`.
    async fn start(
        &self,
        target: SessionTarget,
        track: Track,
        ticket: PlaybackTicket,
    ) -> Result<(), BotError>;

    /// Stops whatever the guild's player is streaming.
    async fn halt(&self, guild_id: GuildId);

    /// Leaves the voice channel.
    async fn disconnect(&self, guild_id: GuildId);
}

/// Posts unsolicited messages such as "now playing".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel: ChannelId, content: String);
}

/// Owns every guild queue and is the only thing that mutates them.
///
/// Each guild sits behind its own async mutex, so commands and player events
/// for one guild are applied one at a time. Player events are handed to one
/// worker task per guild, so a guild stuck joining voice never holds up the
/// others. Entries are created on first use and live as long as the
/// process.
pub struct MusicPlayer {
    queues: DashMap<GuildId, Arc<Mutex<GuildQueue>>>,
    backend: Arc<dyn VoiceBackend>,
    announcer: Arc<dyn Announcer>,
    max_queue_size: usize,
}

impl MusicPlayer {
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        announcer: Arc<dyn Announcer>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            queues: DashMap::new(),
            backend,
            announcer,
            max_queue_size,
        }
    }

    /// Appends `track`; an idle guild starts playing it right away.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        target: SessionTarget,
        track: Track,
    ) -> Result<Enqueued, BotError> {
        let queue = self.get_or_create_queue(guild_id);
        let mut q = queue.lock().await;

        let outcome = q.enqueue(track, target)?;
        debug!("Guild {}: {} tracks pending", guild_id, q.len());
        if outcome == Enqueued::StartNow {
            self.start_front(&mut q).await;
        }
        Ok(outcome)
    }

    /// Drops the playing track and moves on to the next one.
    pub async fn skip(&self, guild_id: GuildId) -> Result<Track, BotError> {
        let queue = self.get_or_create_queue(guild_id);
        let mut q = queue.lock().await;

        let (skipped, advance) = q.skip()?;
        info!("⏭️ Guild {}: skipped {}", guild_id, skipped.title());

        self.backend.halt(guild_id).await;
        self.follow(&mut q, advance).await;
        Ok(skipped)
    }

    /// Clears the queue and leaves voice.
    pub async fn stop(&self, guild_id: GuildId) -> Result<(), BotError> {
        let queue = self.get_or_create_queue(guild_id);
        let mut q = queue.lock().await;

        let cleared = q.stop()?;
        info!("⏹️ Guild {}: stopped, {} tracks cleared", guild_id, cleared);

        self.backend.halt(guild_id).await;
        self.backend.disconnect(guild_id).await;
        Ok(())
    }

    pub async fn listing(&self, guild_id: GuildId) -> Result<Vec<String>, BotError> {
        match self.existing_queue(guild_id) {
            Some(queue) => queue.lock().await.listing(),
            None => Err(BotError::QueueEmpty),
        }
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        match self.existing_queue(guild_id) {
            Some(queue) => queue.lock().await.is_playing(),
            None => false,
        }
    }

    /// Forgets the guild's queue after the bot was removed from voice by
    /// someone else.
    pub async fn reset(&self, guild_id: GuildId) {
        let Some(queue) = self.existing_queue(guild_id) else {
            return;
        };
        let mut q = queue.lock().await;

        q.reset();
        self.backend.disconnect(guild_id).await;
        info!("🔌 Guild {}: queue reset after voice disconnect", guild_id);
    }

    /// Applies one player lifecycle event.
    pub async fn handle_event(&self, event: PlaybackEvent) {
        let guild_id = event.ticket.guild_id;
        let Some(queue) = self.existing_queue(guild_id) else {
            return;
        };
        let mut q = queue.lock().await;

        match &event.kind {
            PlaybackEventKind::Started => {
                if !q.is_current(event.ticket) {
                    return;
                }
                let announcement = q.front().zip(q.session()).map(|(track, target)| {
                    (target.text_channel, format!("🎶 Now playing: {}", track.link()))
                });
                if let Some((channel, content)) = announcement {
                    self.announcer.announce(channel, content).await;
                }
            }
            PlaybackEventKind::Ended | PlaybackEventKind::Failed(_) => {
                let target = q.session();
                let Some((finished, advance)) = q.finish(event.ticket) else {
                    return;
                };

                if let PlaybackEventKind::Failed(reason) = &event.kind {
                    warn!(
                        "❌ Guild {}: playback of {} failed: {}",
                        guild_id,
                        finished.title(),
                        reason
                    );
                    if let Some(target) = target {
                        self.announcer
                            .announce(
                                target.text_channel,
                                format!("⚠️ Could not play {}, skipping it.", finished.link()),
                            )
                            .await;
                    }
                } else {
                    debug!("Guild {}: finished {}", guild_id, finished.title());
                }

                self.follow(&mut q, advance).await;
            }
        }
    }

    /// Drains player events until every sender is gone, routing each one to
    /// its guild's worker. Events for one guild keep their order.
    pub async fn run_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PlaybackEvent>) {
        let mut workers: HashMap<GuildId, mpsc::UnboundedSender<PlaybackEvent>> = HashMap::new();
        let mut tasks = JoinSet::new();

        while let Some(event) = events.recv().await {
            let guild_id = event.ticket.guild_id;
            let worker = workers.entry(guild_id).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                tasks.spawn(self.clone().run_guild_events(guild_id, rx));
                tx
            });
            if worker.send(event).is_err() {
                error!("Guild {}: event worker is gone, dropping event", guild_id);
                workers.remove(&guild_id);
            }
        }

        drop(workers);
        while tasks.join_next().await.is_some() {}
        debug!("Playback event channel closed");
    }

    async fn run_guild_events(
        self: Arc<Self>,
        guild_id: GuildId,
        mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) {
        debug!("Guild {}: event worker started", guild_id);
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
    }

    async fn follow(&self, q: &mut GuildQueue, advance: Advance) {
        match advance {
            Advance::Next => self.start_front(q).await,
            Advance::Drained => self.teardown(q.guild_id()).await,
        }
    }

    /// Starts the front track. Tracks that fail to start are announced and
    /// dropped until one starts or the queue runs dry.
    async fn start_front(&self, q: &mut GuildQueue) {
        while let Some((track, target, ticket)) = q.begin() {
            match self.backend.start(target, track.clone(), ticket).await {
                Ok(()) => {
                    q.mark_playing(ticket);
                    info!("🎵 Guild {}: playing {}", ticket.guild_id, track.title());
                    return;
                }
                Err(e) => {
                    error!(
                        "Guild {}: could not start {}: {}",
                        ticket.guild_id,
                        track.title(),
                        e
                    );
                    self.announcer
                        .announce(target.text_channel, e.user_message())
                        .await;

                    if q.discard_front() == Advance::Drained {
                        break;
                    }
                }
            }
        }

        self.teardown(q.guild_id()).await;
    }

    async fn teardown(&self, guild_id: GuildId) {
        self.backend.disconnect(guild_id).await;
        info!("👋 Guild {}: queue drained, left voice", guild_id);
    }

    fn get_or_create_queue(&self, guild_id: GuildId) -> Arc<Mutex<GuildQueue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildQueue::new(guild_id, self.max_queue_size))))
            .clone()
    }

    fn existing_queue(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildQueue>>> {
        self.queues.get(&guild_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn track(title: &str) -> Track {
        Track::new(title.to_string(), format!("https://youtu.be/{title}"))
    }

    fn target() -> SessionTarget {
        SessionTarget {
            voice_channel: ChannelId::new(10),
            text_channel: ChannelId::new(20),
        }
    }

    /// Backend that accepts every start and records titles and tickets.
    fn recording_backend(
        started: Arc<StdMutex<Vec<(String, PlaybackTicket)>>>,
    ) -> MockVoiceBackend {
        let mut backend = MockVoiceBackend::new();
        backend.expect_start().returning(move |_, track, ticket| {
            started.lock().unwrap().push((track.title().to_string(), ticket));
            Ok(())
        });
        backend
    }

    fn titles(started: &StdMutex<Vec<(String, PlaybackTicket)>>) -> Vec<String> {
        started.lock().unwrap().iter().map(|(title, _)| title.clone()).collect()
    }

    fn last_ticket(started: &StdMutex<Vec<(String, PlaybackTicket)>>) -> PlaybackTicket {
        started.lock().unwrap().last().map(|(_, ticket)| *ticket).unwrap()
    }

    fn player(backend: MockVoiceBackend, announcer: MockAnnouncer) -> MusicPlayer {
        MusicPlayer::new(Arc::new(backend), Arc::new(announcer), 100)
    }

    async fn fill(player: &MusicPlayer, names: &[&str]) {
        for name in names {
            player.enqueue(guild(), target(), track(name)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn first_enqueue_starts_and_second_waits() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let player = player(recording_backend(started.clone()), MockAnnouncer::new());

        assert_eq!(
            player.enqueue(guild(), target(), track("A")).await.unwrap(),
            Enqueued::StartNow
        );
        assert!(player.is_playing(guild()).await);

        assert_eq!(
            player.enqueue(guild(), target(), track("B")).await.unwrap(),
            Enqueued::Waiting(2)
        );
        assert_eq!(titles(&started), vec!["A"]);
    }

    #[tokio::test]
    async fn tracks_play_in_fifo_order() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut backend = recording_backend(started.clone());
        backend.expect_disconnect().times(1).return_const(());
        let player = player(backend, MockAnnouncer::new());

        fill(&player, &["A", "B", "C"]).await;
        for _ in 0..3 {
            let ticket = last_ticket(&started);
            player
                .handle_event(PlaybackEvent {
                    ticket,
                    kind: PlaybackEventKind::Ended,
                })
                .await;
        }

        assert_eq!(titles(&started), vec!["A", "B", "C"]);
        assert!(!player.is_playing(guild()).await);
        assert_eq!(player.listing(guild()).await, Err(BotError::QueueEmpty));
    }

    #[tokio::test]
    async fn skip_starts_the_new_front_exactly_once() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut backend = recording_backend(started.clone());
        backend.expect_halt().times(1).return_const(());
        let player = player(backend, MockAnnouncer::new());

        fill(&player, &["A", "B", "C"]).await;
        let skipped = player.skip(guild()).await.unwrap();

        assert_eq!(skipped.title(), "A");
        assert_eq!(titles(&started), vec!["A", "B"]);
        assert_eq!(player.listing(guild()).await.unwrap().len(), 2);
        assert!(player.is_playing(guild()).await);
    }

    #[tokio::test]
    async fn skip_when_idle_is_rejected_without_side_effects() {
        let player = player(MockVoiceBackend::new(), MockAnnouncer::new());
        assert_eq!(player.skip(guild()).await, Err(BotError::NoActiveTrack));
        assert_eq!(player.listing(guild()).await, Err(BotError::QueueEmpty));
    }

    #[tokio::test]
    async fn end_event_from_a_skipped_track_is_ignored() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut backend = recording_backend(started.clone());
        backend.expect_halt().return_const(());
        let player = player(backend, MockAnnouncer::new());

        fill(&player, &["A", "B", "C"]).await;
        let first = last_ticket(&started);
        player.skip(guild()).await.unwrap();

        // halting A makes the player report its end after the skip
        player
            .handle_event(PlaybackEvent {
                ticket: first,
                kind: PlaybackEventKind::Ended,
            })
            .await;

        assert_eq!(titles(&started), vec!["A", "B"]);
        assert_eq!(player.listing(guild()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stop_clears_everything_and_disconnects() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut backend = recording_backend(started.clone());
        backend.expect_halt().times(1).return_const(());
        backend.expect_disconnect().times(1).return_const(());
        let player = player(backend, MockAnnouncer::new());

        fill(&player, &["A", "B"]).await;
        player.stop(guild()).await.unwrap();

        assert!(!player.is_playing(guild()).await);
        assert_eq!(player.listing(guild()).await, Err(BotError::QueueEmpty));
        assert_eq!(player.stop(guild()).await, Err(BotError::NoActiveTrack));
        assert!(!player.is_playing(guild()).await);
    }

    #[tokio::test]
    async fn end_and_error_advance_the_queue_identically() {
        for kind in [
            PlaybackEventKind::Ended,
            PlaybackEventKind::Failed("Decode".to_string()),
        ] {
            let started = Arc::new(StdMutex::new(Vec::new()));
            let mut announcer = MockAnnouncer::new();
            announcer.expect_announce().return_const(());
            let player = player(recording_backend(started.clone()), announcer);

            fill(&player, &["A", "B"]).await;
            let ticket = last_ticket(&started);
            player.handle_event(PlaybackEvent { ticket, kind }).await;

            assert_eq!(titles(&started), vec!["A", "B"]);
            assert_eq!(player.listing(guild()).await.unwrap().len(), 1);
            assert!(player.is_playing(guild()).await);
        }
    }

    #[tokio::test]
    async fn started_event_announces_now_playing() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut announcer = MockAnnouncer::new();
        announcer
            .expect_announce()
            .withf(|channel, content| {
                *channel == ChannelId::new(20) && content.starts_with("🎶 Now playing: [A]")
            })
            .times(1)
            .return_const(());
        let player = player(recording_backend(started.clone()), announcer);

        fill(&player, &["A"]).await;
        player
            .handle_event(PlaybackEvent {
                ticket: last_ticket(&started),
                kind: PlaybackEventKind::Started,
            })
            .await;
    }

    #[tokio::test]
    async fn failed_spawn_of_sole_track_tears_down() {
        let mut backend = MockVoiceBackend::new();
        backend
            .expect_start()
            .times(1)
            .returning(|_, _, _| Err(BotError::Playback("No such file or directory".into())));
        backend.expect_disconnect().times(1).return_const(());
        let mut announcer = MockAnnouncer::new();
        announcer
            .expect_announce()
            .withf(|_, content| content.contains("Error fetching audio"))
            .times(1)
            .return_const(());
        let player = player(backend, announcer);

        assert_eq!(
            player.enqueue(guild(), target(), track("A")).await.unwrap(),
            Enqueued::StartNow
        );
        assert!(!player.is_playing(guild()).await);
        assert_eq!(player.listing(guild()).await, Err(BotError::QueueEmpty));
    }

    #[tokio::test]
    async fn failed_start_moves_on_to_the_next_track() {
        let mut backend = MockVoiceBackend::new();
        backend
            .expect_start()
            .withf(|_, track, _| track.title() == "A")
            .times(1)
            .returning(|_, _, _| Err(BotError::Playback("spawn".into())));
        backend
            .expect_start()
            .withf(|_, track, _| track.title() == "B")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut announcer = MockAnnouncer::new();
        announcer.expect_announce().times(1).return_const(());
        let player = player(backend, announcer);

        // A is still starting when B arrives, so both are queued before the
        // first start happens.
        {
            let queue = player.get_or_create_queue(guild());
            let mut q = queue.lock().await;
            q.enqueue(track("A"), target()).unwrap();
            q.enqueue(track("B"), target()).unwrap();
            player.start_front(&mut q).await;
        }

        assert!(player.is_playing(guild()).await);
        assert_eq!(
            player.listing(guild()).await.unwrap(),
            vec!["1. [B](<https://youtu.be/B>)".to_string()]
        );
    }

    #[tokio::test]
    async fn reset_forgets_the_queue() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut backend = recording_backend(started.clone());
        backend.expect_disconnect().times(1).return_const(());
        let player = player(backend, MockAnnouncer::new());

        fill(&player, &["A", "B"]).await;
        let ticket = last_ticket(&started);
        player.reset(guild()).await;
        player
            .handle_event(PlaybackEvent {
                ticket,
                kind: PlaybackEventKind::Ended,
            })
            .await;

        assert!(!player.is_playing(guild()).await);
        assert_eq!(titles(&started), vec!["A"]);
    }

    #[tokio::test]
    async fn run_events_drains_the_channel() {
        let started = Arc::new(StdMutex::new(Vec::new()));
        let mut backend = recording_backend(started.clone());
        backend.expect_disconnect().times(1).return_const(());
        let player = Arc::new(player(backend, MockAnnouncer::new()));

        fill(&player, &["A"]).await;
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(PlaybackEvent {
            ticket: last_ticket(&started),
            kind: PlaybackEventKind::Ended,
        })
        .unwrap();
        drop(tx);

        player.clone().run_events(rx).await;
        assert!(!player.is_playing(guild()).await);
    }

    /// Backend whose second start in guild 1 never finishes joining.
    struct StuckBackend {
        started: StdMutex<Vec<(GuildId, String, PlaybackTicket)>>,
    }

    #[async_trait]
    impl VoiceBackend for StuckBackend {
        async fn start(
            &self,
            _target: SessionTarget,
            track: Track,
            ticket: PlaybackTicket,
        ) -> Result<(), BotError> {
            let stuck = ticket.guild_id == GuildId::new(1) && track.title() == "B";
            self.started
                .lock()
                .unwrap()
                .push((ticket.guild_id, track.title().to_string(), ticket));
            if stuck {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn halt(&self, _guild_id: GuildId) {}

        async fn disconnect(&self, _guild_id: GuildId) {}
    }

    #[tokio::test]
    async fn stuck_guild_does_not_hold_up_other_guilds() {
        let backend = Arc::new(StuckBackend {
            started: StdMutex::new(Vec::new()),
        });
        let player = Arc::new(MusicPlayer::new(
            backend.clone(),
            Arc::new(MockAnnouncer::new()),
            100,
        ));
        let (slow, fast) = (GuildId::new(1), GuildId::new(2));

        for guild_id in [slow, fast] {
            for name in ["A", "B"] {
                player.enqueue(guild_id, target(), track(name)).await.unwrap();
            }
        }
        let ticket_of = |guild_id: GuildId| {
            backend
                .started
                .lock()
                .unwrap()
                .iter()
                .find(|(g, title, _)| *g == guild_id && title == "A")
                .map(|(_, _, ticket)| *ticket)
                .unwrap()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let events = tokio::spawn(player.clone().run_events(rx));
        for guild_id in [slow, fast] {
            tx.send(PlaybackEvent {
                ticket: ticket_of(guild_id),
                kind: PlaybackEventKind::Ended,
            })
            .unwrap();
        }

        let fast_started_b = || {
            backend
                .started
                .lock()
                .unwrap()
                .iter()
                .any(|(g, title, _)| *g == fast && title == "B")
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !fast_started_b() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            player.listing(fast).await.unwrap(),
            vec!["1. [B](<https://youtu.be/B>)".to_string()]
        );
        assert!(player.is_playing(fast).await);
        events.abort();
    }
}
