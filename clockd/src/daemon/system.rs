use std::time::Duration;

use clock_proto::{
    Alarm, AlarmBook, AlarmMode, ClockReading, ClockTimeResolver, FetchFailure, FetchTicket,
    Precedence, RemoteReading, ResolverSettings, TickOutcome,
};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, warn};

use super::{
    clock::{HostClock, WallClock},
    config::Config,
    notify::{AlarmNotifier, TerminalNotifier},
    remote::RemoteSource,
    render::{NoRenderer, Renderer, TerminalRenderer},
    store::{self, StateStore},
};

pub const MESSAGE_BUFFER_SIZE: usize = 32;

/// What the clock currently shows, as seen by the control socket and the
/// publish endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    /// Outcome of the most recent tick, absent before the first one
    pub tick: Option<TickOutcome>,
    pub backend_available: bool,
    pub override_time: Option<ClockReading>,
    pub alarms: AlarmBook,
    pub precedence: Precedence,
    pub alarm_mode: AlarmMode,
}

impl ClockSnapshot {
    fn of(resolver: &ClockTimeResolver, tick: Option<TickOutcome>) -> Self {
        let settings = resolver.settings();
        ClockSnapshot {
            tick,
            backend_available: resolver.backend_available(),
            override_time: resolver.override_time(),
            alarms: resolver.alarms().clone(),
            precedence: settings.precedence,
            alarm_mode: settings.alarm_mode,
        }
    }

    /// The current reading in the remote endpoint format
    pub fn remote_reading(&self) -> Option<RemoteReading> {
        self.tick
            .as_ref()
            .map(|tick| RemoteReading::new(tick.angles, tick.reading, tick.alarm_ringing))
    }
}

/// A user action, already validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAction {
    SetAlarm(Alarm),
    DeleteAlarm(usize),
    SetTime(ClockReading),
    Sync,
}

/// Success or error message for the user
pub type ActionResult = Result<String, String>;

#[derive(Debug)]
pub struct ClockCommand {
    pub action: ClockAction,
    pub reply: oneshot::Sender<ActionResult>,
}

/// Cloneable access to a running [`ClockTask`]
#[derive(Debug, Clone)]
pub struct ClockHandle {
    commands: mpsc::Sender<ClockCommand>,
    snapshots: watch::Receiver<ClockSnapshot>,
}

impl ClockHandle {
    pub fn snapshot(&self) -> ClockSnapshot {
        self.snapshots.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.snapshots.clone()
    }

    /// Hand `action` to the clock task and wait until it has been applied
    pub async fn perform(&self, action: ClockAction) -> ActionResult {
        const STOPPED: &str = "the clock task is not running";

        let (reply, response) = oneshot::channel();
        self.commands
            .send(ClockCommand { action, reply })
            .await
            .map_err(|_| STOPPED.to_string())?;
        response.await.map_err(|_| STOPPED.to_string())?
    }
}

type FetchResult = (FetchTicket, Result<RemoteReading, FetchFailure>);

/// Owns the resolver and is the only writer of clock state
pub struct ClockTask<C> {
    resolver: ClockTimeResolver,
    wall_clock: C,
    tick_interval: Duration,
    remote: Option<RemoteSource>,
    store: Box<dyn StateStore>,
    renderer: Box<dyn Renderer>,
    notifier: Box<dyn AlarmNotifier>,
    commands: mpsc::Receiver<ClockCommand>,
    fetch_tx: mpsc::Sender<FetchResult>,
    fetch_rx: mpsc::Receiver<FetchResult>,
    snapshot_tx: watch::Sender<ClockSnapshot>,
    last_tick: Option<TickOutcome>,
}

/// Spawn the clock task for `config`
pub fn spawn(config: &Config) -> Result<(JoinHandle<()>, ClockHandle), FetchFailure> {
    let remote = config.remote.as_ref().map(RemoteSource::new).transpose()?;

    let renderer: Box<dyn Renderer> = if config.display.enabled {
        Box::new(TerminalRenderer::stdout())
    } else {
        Box::new(NoRenderer)
    };

    let (task, handle) = ClockTask::new(
        config.clock.resolver_settings(),
        config.clock.tick_interval(),
        HostClock::new(config.clock.time_zone),
        remote,
        store::open(config.state.path.as_deref()),
        renderer,
        Box::new(TerminalNotifier::stdout(config.display.bell)),
    );

    Ok((tokio::spawn(task.run()), handle))
}

impl<C: WallClock> ClockTask<C> {
    pub fn new(
        settings: ResolverSettings,
        tick_interval: Duration,
        wall_clock: C,
        remote: Option<RemoteSource>,
        store: Box<dyn StateStore>,
        renderer: Box<dyn Renderer>,
        notifier: Box<dyn AlarmNotifier>,
    ) -> (Self, ClockHandle) {
        let (override_time, alarms) = store::load_state(store.as_ref());
        if let Some(reading) = override_time {
            debug!(%reading, "restored clock override");
        }
        debug!(alarms = alarms.len(), "restored alarms");

        let resolver = ClockTimeResolver::with_state(settings, override_time, alarms);
        let (commands_tx, commands) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let (fetch_tx, fetch_rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let (snapshot_tx, snapshots) = watch::channel(ClockSnapshot::of(&resolver, None));

        let task = ClockTask {
            resolver,
            wall_clock,
            tick_interval,
            remote,
            store,
            renderer,
            notifier,
            commands,
            fetch_tx,
            fetch_rx,
            snapshot_tx,
            last_tick: None,
        };
        let handle = ClockHandle {
            commands: commands_tx,
            snapshots,
        };

        (task, handle)
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                Some((ticket, result)) = self.fetch_rx.recv() => {
                    let wall = self.wall_clock.now();
                    if let Some(outcome) = self.resolver.complete_fetch(ticket, result, wall) {
                        self.present(outcome);
                    }
                }
                Some(command) = self.commands.recv() => {
                    let result = self.apply(command.action);
                    self.publish();
                    // the requester may have given up waiting
                    let _ = command.reply.send(result);
                }
            }
        }
    }

    fn tick(&mut self) {
        let remote = if self.resolver.consults_remote() {
            self.remote.clone()
        } else {
            None
        };
        let Some(remote) = remote else {
            let outcome = self.resolver.tick_local(self.wall_clock.now());
            self.present(outcome);
            return;
        };

        let ticket = self.resolver.begin_fetch();
        let sender = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = remote.fetch().await;
            // only fails when the clock task is gone
            let _ = sender.send((ticket, result)).await;
        });
    }

    fn present(&mut self, outcome: TickOutcome) {
        if let Err(error) = self.renderer.render(&outcome) {
            warn!(?error, "could not display the clock");
        }
        for alarm in &outcome.fired {
            if let Err(error) = self.notifier.notify(alarm) {
                warn!(?error, %alarm, "could not signal alarm");
            }
        }

        self.last_tick = Some(outcome);
        self.publish();
    }

    fn publish(&mut self) {
        let snapshot = ClockSnapshot::of(&self.resolver, self.last_tick.clone());
        self.snapshot_tx.send_replace(snapshot);
    }

    fn apply(&mut self, action: ClockAction) -> ActionResult {
        match action {
            ClockAction::SetAlarm(alarm) => {
                let index = self.resolver.add_alarm(alarm).map_err(|e| e.to_string())?;
                let saved = store::save_alarms(self.store.as_ref(), self.resolver.alarms());
                persisted(format!("alarm {alarm} set as alarm {index}"), saved)
            }
            ClockAction::DeleteAlarm(index) => {
                let alarm = self
                    .resolver
                    .delete_alarm(index)
                    .map_err(|e| e.to_string())?;
                let saved = store::save_alarms(self.store.as_ref(), self.resolver.alarms());
                persisted(format!("alarm {alarm} deleted"), saved)
            }
            ClockAction::SetTime(reading) => {
                self.resolver.set_override(reading);
                let saved = store::save_override(self.store.as_ref(), Some(reading));
                persisted(format!("clock set to {reading}"), saved)
            }
            ClockAction::Sync => {
                self.resolver.clear_override();
                let saved = store::save_override(self.store.as_ref(), None);
                persisted("clock follows real time".to_string(), saved)
            }
        }
    }
}

fn persisted(message: String, saved: std::io::Result<()>) -> ActionResult {
    match saved {
        Ok(()) => Ok(message),
        Err(error) => {
            warn!(?error, "could not persist clock state");
            Err(format!("{message}, but saving the change failed: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use clock_proto::TimeSource;

    use super::*;
    use crate::daemon::{
        clock::FixedClock,
        remote::tests::{serve, source},
        store::{MemoryStore, OVERRIDE_SLOT},
    };

    #[derive(Clone, Default)]
    struct Recorder {
        ticks: Arc<Mutex<Vec<TickOutcome>>>,
        alarms: Arc<Mutex<Vec<Alarm>>>,
    }

    impl Renderer for Recorder {
        fn render(&mut self, outcome: &TickOutcome) -> std::io::Result<()> {
            self.ticks.lock().unwrap().push(outcome.clone());
            Ok(())
        }
    }

    impl AlarmNotifier for Recorder {
        fn notify(&mut self, alarm: &Alarm) -> std::io::Result<()> {
            self.alarms.lock().unwrap().push(*alarm);
            Ok(())
        }
    }

    /// Keeps the store reachable after it moved into the task
    #[derive(Clone, Default)]
    struct SharedStore(Arc<MemoryStore>);

    impl StateStore for SharedStore {
        fn read(&self, slot: &str) -> std::io::Result<Option<Vec<u8>>> {
            self.0.read(slot)
        }

        fn write(&self, slot: &str, bytes: &[u8]) -> std::io::Result<()> {
            self.0.write(slot, bytes)
        }

        fn remove(&self, slot: &str) -> std::io::Result<()> {
            self.0.remove(slot)
        }
    }

    struct Harness {
        handle: ClockHandle,
        recorder: Recorder,
        store: SharedStore,
        task: JoinHandle<()>,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    fn start(wall: &FixedClock, remote: Option<RemoteSource>, store: SharedStore) -> Harness {
        let recorder = Recorder::default();
        let (task, handle) = ClockTask::new(
            ResolverSettings::default(),
            Duration::from_millis(10),
            wall.clone(),
            remote,
            Box::new(store.clone()),
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
        );
        Harness {
            handle,
            recorder,
            store,
            task: tokio::spawn(task.run()),
        }
    }

    async fn next_tick(
        snapshots: &mut watch::Receiver<ClockSnapshot>,
        accept: impl Fn(&TickOutcome) -> bool,
    ) -> TickOutcome {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                snapshots.changed().await.unwrap();
                if let Some(tick) = snapshots.borrow_and_update().tick.clone() {
                    if accept(&tick) {
                        return tick;
                    }
                }
            }
        })
        .await
        .unwrap()
    }

    fn reading(h: i64, m: i64, s: i64) -> ClockReading {
        ClockReading::new(h, m, s).unwrap()
    }

    #[tokio::test]
    async fn ticks_on_wall_time() {
        let wall = FixedClock::at(reading(10, 15, 30));
        let harness = start(&wall, None, SharedStore::default());
        let mut snapshots = harness.handle.subscribe();

        let tick = next_tick(&mut snapshots, |_| true).await;
        assert_eq!(tick.source, TimeSource::LocalSimulated);
        assert_eq!(tick.reading, reading(10, 15, 30));
        assert!(!harness.recorder.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_time_and_sync() {
        let wall = FixedClock::at(reading(10, 15, 30));
        let harness = start(&wall, None, SharedStore::default());
        let mut snapshots = harness.handle.subscribe();

        let message = harness
            .handle
            .perform(ClockAction::SetTime(reading(23, 59, 58)))
            .await
            .unwrap();
        assert_eq!(message, "clock set to 23:59:58");
        assert!(harness.store.read(OVERRIDE_SLOT).unwrap().is_some());

        next_tick(&mut snapshots, |t| t.source == TimeSource::UserOverride).await;
        let first_override = harness
            .recorder
            .ticks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.source == TimeSource::UserOverride)
            .map(|t| t.reading);
        assert_eq!(first_override, Some(reading(23, 59, 59)));

        harness.handle.perform(ClockAction::Sync).await.unwrap();
        assert_eq!(harness.handle.snapshot().override_time, None);
        assert_eq!(harness.store.read(OVERRIDE_SLOT).unwrap(), None);

        let tick = next_tick(&mut snapshots, |t| t.source == TimeSource::LocalSimulated).await;
        assert_eq!(tick.reading, reading(10, 15, 30));
    }

    #[tokio::test]
    async fn restores_persisted_state() {
        let store = SharedStore::default();
        store::save_override(&store, Some(reading(6, 0, 0))).unwrap();
        let mut book = AlarmBook::new();
        book.add(Alarm::new(7, 0).unwrap()).unwrap();
        store::save_alarms(&store, &book).unwrap();

        let wall = FixedClock::at(reading(12, 0, 0));
        let harness = start(&wall, None, store);

        let snapshot = harness.handle.snapshot();
        assert_eq!(snapshot.override_time, Some(reading(6, 0, 0)));
        assert_eq!(snapshot.alarms, book);
    }

    #[tokio::test]
    async fn alarm_actions() {
        let wall = FixedClock::at(reading(12, 0, 0));
        let harness = start(&wall, None, SharedStore::default());

        let seven = Alarm::new(7, 0).unwrap();
        let eight = Alarm::new(8, 0).unwrap();
        harness
            .handle
            .perform(ClockAction::SetAlarm(seven))
            .await
            .unwrap();
        harness
            .handle
            .perform(ClockAction::SetAlarm(eight))
            .await
            .unwrap();

        let duplicate = harness.handle.perform(ClockAction::SetAlarm(seven)).await;
        assert!(duplicate.unwrap_err().contains("07:00"));

        let missing = harness.handle.perform(ClockAction::DeleteAlarm(5)).await;
        assert!(missing.is_err());

        let message = harness
            .handle
            .perform(ClockAction::DeleteAlarm(0))
            .await
            .unwrap();
        assert_eq!(message, "alarm 07:00 deleted");

        let snapshot = harness.handle.snapshot();
        assert_eq!(snapshot.alarms.active(), Some(eight));

        let (_, persisted) = store::load_state(&harness.store);
        assert_eq!(persisted, snapshot.alarms);
    }

    #[tokio::test]
    async fn alarm_notifies_once() {
        let wall = FixedClock::at(reading(7, 29, 59));
        let harness = start(&wall, None, SharedStore::default());
        let mut snapshots = harness.handle.subscribe();

        harness
            .handle
            .perform(ClockAction::SetAlarm(Alarm::new(7, 30).unwrap()))
            .await
            .unwrap();

        // the wall clock stands still on second 0, so every tick sees it
        wall.set(reading(7, 30, 0));
        next_tick(&mut snapshots, |t| t.alarm_ringing).await;
        for _ in 0..5 {
            next_tick(&mut snapshots, |_| true).await;
        }

        assert_eq!(
            *harness.recorder.alarms.lock().unwrap(),
            [Alarm::new(7, 30).unwrap()]
        );
    }

    #[tokio::test]
    async fn follows_remote_and_falls_back() {
        let body = r#"{"hora": 304.0, "minuto": 48.5, "segundo": 30.0, "alarma": true,
            "hora_actual": 22, "minuto_actual": 8, "segundo_actual": 5}"#;
        let (addr, _) = serve("200 OK", body.into(), Duration::ZERO).await;

        let wall = FixedClock::at(reading(1, 2, 3));
        let harness = start(&wall, Some(source(addr, 1000, false)), SharedStore::default());
        let mut snapshots = harness.handle.subscribe();

        let tick = next_tick(&mut snapshots, |t| t.source == TimeSource::RemoteBackend).await;
        assert_eq!(tick.reading, reading(22, 8, 5));
        assert_eq!(tick.angles.minute, 48.5);
        assert!(tick.alarm_ringing);
        assert!(harness.handle.snapshot().backend_available);

        let published = harness.handle.snapshot().remote_reading().unwrap();
        assert_eq!(published.hour_angle, 304.0);
        assert!(published.alarm);
    }

    #[tokio::test]
    async fn unavailable_remote_falls_back() {
        let (addr, _) = serve("500 Internal Server Error", String::new(), Duration::ZERO).await;

        let wall = FixedClock::at(reading(1, 2, 3));
        let harness = start(&wall, Some(source(addr, 1000, false)), SharedStore::default());
        let mut snapshots = harness.handle.subscribe();

        let tick = next_tick(&mut snapshots, |_| true).await;
        assert_eq!(tick.source, TimeSource::LocalSimulated);
        assert_eq!(tick.reading, reading(1, 2, 3));
        assert!(!harness.handle.snapshot().backend_available);
    }

    #[tokio::test]
    async fn stopped_task() {
        let wall = FixedClock::at(reading(1, 2, 3));
        let harness = start(&wall, None, SharedStore::default());
        harness.task.abort();
        let handle = harness.handle.clone();
        drop(harness);
        tokio::task::yield_now().await;

        let result = handle.perform(ClockAction::Sync).await;
        assert_eq!(result.unwrap_err(), "the clock task is not running");
    }
}
