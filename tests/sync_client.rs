use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bets_sync::websocket::{Connector, Transport};
use bets_sync::{
    ConnectionStatus, Error, EventRouter, GroupId, GroupRefresher, PoolId, PoolRefresher,
    RefreshAction, Result, SyncClient, SyncPolicy,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy)]
enum Step {
    Refuse,
    Accept,
}

type ServerTx = mpsc::UnboundedSender<Result<String>>;

/// In-memory server: records connects and hands out scripted transports
#[derive(Default)]
struct Server {
    script: Mutex<VecDeque<Step>>,
    connects: Mutex<Vec<(GroupId, Instant)>>,
    channels: Mutex<Vec<(GroupId, ServerTx)>>,
    live: Arc<AtomicUsize>,
}

impl Server {
    fn with_script(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        let server = Self::default();
        server.script.lock().extend(steps);
        Arc::new(server)
    }

    fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().iter().map(|(_, at)| *at).collect()
    }

    fn connected_groups(&self) -> Vec<GroupId> {
        self.connects.lock().iter().map(|(g, _)| g.clone()).collect()
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Channel of the most recent accepted transport
    fn latest(&self) -> ServerTx {
        self.channels.lock().last().expect("nothing accepted yet").1.clone()
    }

    fn push(&self, frame: &str) {
        let _ = self.latest().send(Ok(frame.to_string()));
    }

    /// Server-side close of the most recent transport
    fn hang_up(&self) {
        self.channels.lock().pop();
    }
}

struct ScriptedConnector(Arc<Server>);

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn connect(&self, group_id: &GroupId) -> Result<ScriptedTransport> {
        let server = &self.0;
        server.connects.lock().push((group_id.clone(), Instant::now()));

        let step = server.script.lock().pop_front().unwrap_or(Step::Accept);
        match step {
            Step::Refuse => Err(Error::WebSocket("connection refused".to_string())),
            Step::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                server.channels.lock().push((group_id.clone(), tx));
                server.live.fetch_add(1, Ordering::SeqCst);
                Ok(ScriptedTransport {
                    frames: rx,
                    live: Arc::clone(&server.live),
                })
            }
        }
    }
}

struct ScriptedTransport {
    frames: mpsc::UnboundedReceiver<Result<String>>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.frames.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.frames.close();
        Ok(())
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Refresher fake recording every request
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<RefreshAction>>,
    active_pool: Mutex<Option<PoolId>>,
}

impl Recorder {
    fn take(&self) -> Vec<RefreshAction> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl GroupRefresher for Recorder {
    fn refresh_group(&self, group_id: &GroupId) {
        self.calls.lock().push(RefreshAction::Group(group_id.clone()));
    }
}

impl PoolRefresher for Recorder {
    fn refresh_pools(&self, group_id: &GroupId) {
        self.calls.lock().push(RefreshAction::Pools(group_id.clone()));
    }

    fn refresh_pool(&self, group_id: &GroupId, pool_id: &PoolId) {
        self.calls
            .lock()
            .push(RefreshAction::Pool(group_id.clone(), pool_id.clone()));
    }

    fn active_pool_id(&self) -> Option<PoolId> {
        self.active_pool.lock().clone()
    }
}

struct Harness {
    server: Arc<Server>,
    recorder: Arc<Recorder>,
    client: SyncClient,
}

fn harness(steps: impl IntoIterator<Item = Step>) -> Harness {
    let server = Server::with_script(steps);
    let recorder = Arc::new(Recorder::default());
    let policy = SyncPolicy::new(recorder.clone(), recorder.clone());
    let client = SyncClient::spawn(
        ScriptedConnector(Arc::clone(&server)),
        EventRouter::new(policy),
        Default::default(),
    );
    Harness {
        server,
        recorder,
        client,
    }
}

/// Let every runnable task finish without reaching any retry timer
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

fn gaps(times: &[Instant]) -> Vec<Duration> {
    times.windows(2).map(|w| w[1] - w[0]).collect()
}

fn assert_gap(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(50),
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_connects_back_off_1_2_4_seconds() {
    let h = harness([Step::Refuse, Step::Refuse, Step::Refuse, Step::Refuse]);

    h.client.connect("g1");
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Reconnecting);

    sleep(Duration::from_secs(8)).await;
    let times = h.server.connect_times();
    assert_eq!(times.len(), 4);

    let gaps = gaps(&times);
    assert_gap(gaps[0], Duration::from_secs(1));
    assert_gap(gaps[1], Duration::from_secs(2));
    assert_gap(gaps[2], Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_leaves_closed_until_manual_connect() {
    let h = harness(std::iter::repeat(Step::Refuse).take(11));

    h.client.connect("g1");
    // 1 + 2 + 4 + 8 + 16 + 5 * 30 seconds of backoff
    sleep(Duration::from_secs(200)).await;
    assert_eq!(h.client.status(), ConnectionStatus::Closed);
    assert_eq!(h.server.connect_times().len(), 11);

    // Nothing else is scheduled
    sleep(Duration::from_secs(120)).await;
    assert_eq!(h.server.connect_times().len(), 11);

    h.client.connect("g1");
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Open);
    assert_eq!(h.server.connect_times().len(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_backoff() {
    let h = harness([Step::Refuse, Step::Refuse, Step::Refuse]);

    h.client.connect("g1");
    sleep(Duration::from_secs(8)).await;
    assert_eq!(h.client.status(), ConnectionStatus::Open);
    assert_eq!(h.server.connect_times().len(), 4);

    let hung_up_at = Instant::now();
    h.server.hang_up();
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Reconnecting);

    sleep(Duration::from_secs(2)).await;
    let times = h.server.connect_times();
    assert_eq!(times.len(), 5);
    assert_gap(times[4] - hung_up_at, Duration::from_secs(1));
    assert_eq!(h.client.status(), ConnectionStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_leave_connection_untouched() {
    let h = harness([]);

    h.client.connect("g1");
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Open);

    h.server.push("not json");
    h.server.push(r#"{"payload":{}}"#);
    h.server.push("");
    settle().await;

    assert_eq!(h.client.status(), ConnectionStatus::Open);
    assert_eq!(h.server.connect_times().len(), 1);
    assert!(h.recorder.take().is_empty());
    assert_eq!(h.client.router_stats().malformed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_bet_placed_refreshes_list_and_observed_pool() {
    let h = harness([]);
    *h.recorder.active_pool.lock() = Some(PoolId::new("p1"));

    h.client.connect("g1");
    settle().await;
    h.server
        .push(r#"{"type":"bet_placed","payload":{"pool_id":"p1","points":50}}"#);
    settle().await;

    assert_eq!(
        h.recorder.take(),
        vec![
            RefreshAction::Pools(GroupId::new("g1")),
            RefreshAction::Pool(GroupId::new("g1"), PoolId::new("p1")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_member_kicked_refreshes_group_only() {
    let h = harness([]);
    *h.recorder.active_pool.lock() = Some(PoolId::new("p1"));

    h.client.connect("g1");
    settle().await;
    h.server
        .push(r#"{"type":"member_kicked","payload":{"user_id":"u2"}}"#);
    settle().await;

    assert_eq!(h.recorder.take(), vec![RefreshAction::Group(GroupId::new("g1"))]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_notification_is_ignored() {
    let h = harness([]);

    h.client.connect("g1");
    settle().await;
    h.server.push(r#"{"type":"season_started","payload":{}}"#);
    settle().await;

    assert!(h.recorder.take().is_empty());
    assert_eq!(h.client.router_stats().unrecognized, 1);
    assert_eq!(h.client.status(), ConnectionStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn test_switching_groups_keeps_one_transport() {
    let h = harness([]);

    h.client.connect("g1");
    settle().await;
    let old = h.server.latest();

    h.client.connect("g2");
    settle().await;

    assert_eq!(h.server.live(), 1);
    assert_eq!(h.server.connected_groups().last(), Some(&GroupId::new("g2")));
    assert_eq!(h.client.status(), ConnectionStatus::Open);

    // The g1 socket is gone and can no longer reach the caches
    let _ = old.send(Ok(r#"{"type":"member_joined","payload":{}}"#.to_string()));
    h.server.push(r#"{"type":"member_joined","payload":{}}"#);
    settle().await;
    assert_eq!(h.recorder.take(), vec![RefreshAction::Group(GroupId::new("g2"))]);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_group_switches_settle_on_last() {
    let h = harness([]);

    for group in ["g1", "g2", "g3", "g4"] {
        h.client.connect(group);
    }
    settle().await;

    assert_eq!(h.server.live(), 1);
    assert_eq!(h.server.connected_groups().last(), Some(&GroupId::new("g4")));

    h.server.push(r#"{"type":"points_granted","payload":{}}"#);
    settle().await;
    assert_eq!(h.recorder.take(), vec![RefreshAction::Group(GroupId::new("g4"))]);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_reconnects_once() {
    let h = harness([]);

    h.client.connect("g1");
    settle().await;
    let _ = h
        .server
        .latest()
        .send(Err(Error::WebSocket("connection reset".to_string())));
    settle().await;

    assert_eq!(h.client.status(), ConnectionStatus::Reconnecting);
    assert_eq!(h.server.live(), 0);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.server.connect_times().len(), 2);
    assert_eq!(h.server.live(), 1);
    assert_eq!(h.client.status(), ConnectionStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let h = harness([Step::Refuse]);

    h.client.connect("g1");
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Reconnecting);

    h.client.disconnect();
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Idle);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.server.connect_times().len(), 1);
    assert_eq!(h.server.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_live_transport() {
    let h = harness([]);

    h.client.connect("g1");
    settle().await;
    assert_eq!(h.server.live(), 1);

    h.client.disconnect();
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Idle);
    assert_eq!(h.server.live(), 0);

    // A second disconnect is a no-op
    h.client.disconnect();
    settle().await;
    assert_eq!(h.client.status(), ConnectionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_status_transitions_are_observable() {
    let h = harness([Step::Refuse]);
    let mut status = h.client.subscribe_status();
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Idle);

    h.client.connect("g1");
    status
        .wait_for(|s| *s == ConnectionStatus::Reconnecting)
        .await
        .unwrap();
    let refused_at = Instant::now();
    status
        .wait_for(|s| *s == ConnectionStatus::Open)
        .await
        .unwrap();
    assert_gap(refused_at.elapsed(), Duration::from_secs(1));

    h.client.shutdown().await;
    settle().await;
    assert_eq!(h.server.live(), 0);
}
