use crate::state::{ConnectionState, Direction};
use crate::storage::{ConnectionStore, StoredObject};
use bytes::BytesMut;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the proxy has learned about the player behind a connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub username: Option<String>,
    pub uuid: Option<Uuid>,
    /// Protocol version the client announced in its handshake.
    pub client_protocol: i32,
}

impl ConnectionInfo {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            username: None,
            uuid: None,
            client_protocol: -1,
        }
    }
}

/// A serialized packet (id + body, not yet framed) produced by translation logic.
#[derive(Debug, Clone)]
pub struct OutgoingPacket {
    pub direction: Direction,
    pub data: BytesMut,
}

/// Synthetic packets waiting to be written by the transport, in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    packets: Vec<OutgoingPacket>,
}

impl Outbox {
    pub fn push(&mut self, direction: Direction, data: BytesMut) {
        self.packets.push(OutgoingPacket { direction, data });
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutgoingPacket> {
        self.packets.iter()
    }

    pub fn drain(&mut self) -> Vec<OutgoingPacket> {
        std::mem::take(&mut self.packets)
    }
}

/// Work that must run on the connection's own processing loop.
pub type ConnectionTask = Box<dyn FnOnce(&mut UserConnection) + Send>;

/// Handle for submitting tasks from outside the connection's loop.
#[derive(Clone)]
pub struct TaskSender(mpsc::UnboundedSender<ConnectionTask>);

impl TaskSender {
    /// Queue a task. Returns false if the connection is gone.
    pub fn schedule(&self, task: impl FnOnce(&mut UserConnection) + Send + 'static) -> bool {
        self.0.send(Box::new(task)).is_ok()
    }
}

/// Receiving side of a connection's task queue, drained by its processing loop.
pub struct TaskQueue(mpsc::UnboundedReceiver<ConnectionTask>);

impl TaskQueue {
    pub async fn recv(&mut self) -> Option<ConnectionTask> {
        self.0.recv().await
    }

    /// Run every task queued so far. Returns how many ran.
    pub fn run_pending(&mut self, conn: &mut UserConnection) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.0.try_recv() {
            task(conn);
            ran += 1;
        }
        ran
    }
}

/// One proxied player connection as seen by the translation engine.
pub struct UserConnection {
    info: ConnectionInfo,
    state: ConnectionState,
    store: ConnectionStore,
    outbox: Outbox,
    tasks: TaskSender,
    closed: bool,
}

impl UserConnection {
    pub fn new(info: ConnectionInfo) -> (Self, TaskQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            info,
            state: ConnectionState::Handshaking,
            store: ConnectionStore::new(),
            outbox: Outbox::default(),
            tasks: TaskSender(tx),
            closed: false,
        };
        (conn, TaskQueue(rx))
    }

    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut ConnectionInfo {
        &mut self.info
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        debug!("Connection {} {:?} -> {:?}", self.info.id, self.state, state);
        self.state = state;
    }

    pub fn get<T: StoredObject>(&self) -> Option<&T> {
        self.store.get::<T>()
    }

    pub fn get_or_create<T: StoredObject>(&mut self) -> &mut T {
        self.store.get_or_create::<T>(&self.info)
    }

    /// Borrow a stored object together with the outbox, so it can emit packets.
    pub fn with<T: StoredObject, R>(&mut self, f: impl FnOnce(&mut T, &mut Outbox) -> R) -> R {
        let object = self.store.get_or_create::<T>(&self.info);
        f(object, &mut self.outbox)
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// Take every synthetic packet emitted since the last call.
    pub fn take_outbox(&mut self) -> Vec<OutgoingPacket> {
        self.outbox.drain()
    }

    pub fn task_sender(&self) -> TaskSender {
        self.tasks.clone()
    }

    /// Defer work to the connection's loop, after the packet being processed.
    pub fn schedule(&self, task: impl FnOnce(&mut UserConnection) + Send + 'static) {
        if !self.tasks.schedule(task) {
            debug!("Dropping task for closed connection {}", self.info.id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Remove the connection from the pipeline and dispose its stored objects.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.store.dispose(&mut self.outbox);
        debug!("Connection {} closed", self.info.id);
    }
}

impl Drop for UserConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flag {
        set: bool,
    }

    impl StoredObject for Flag {
        fn create(_info: &ConnectionInfo) -> Self {
            Flag { set: false }
        }
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::next(), ConnectionId::next());
    }

    #[test]
    fn test_scheduled_task_runs_on_drain() {
        let (mut conn, mut queue) = UserConnection::new(ConnectionInfo::new(ConnectionId(7)));
        let sender = conn.task_sender();
        assert!(sender.schedule(|conn| conn.get_or_create::<Flag>().set = true));
        // Nothing happens until the connection's own loop drains the queue.
        assert!(conn.get::<Flag>().is_none());
        assert_eq!(queue.run_pending(&mut conn), 1);
        assert!(conn.get::<Flag>().map(|f| f.set).unwrap_or(false));
    }

    #[test]
    fn test_schedule_after_queue_dropped() {
        let (conn, queue) = UserConnection::new(ConnectionInfo::new(ConnectionId(8)));
        drop(queue);
        assert!(!conn.task_sender().schedule(|_| {}));
    }

    #[test]
    fn test_with_gives_outbox() {
        let (mut conn, _queue) = UserConnection::new(ConnectionInfo::new(ConnectionId(9)));
        conn.with::<Flag, _>(|flag, outbox| {
            flag.set = true;
            outbox.push(Direction::Outbound, BytesMut::from(&[0x01][..]));
        });
        assert_eq!(conn.outbox().len(), 1);
        assert_eq!(conn.take_outbox().len(), 1);
        assert!(conn.outbox().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut conn, _queue) = UserConnection::new(ConnectionInfo::new(ConnectionId(10)));
        conn.get_or_create::<Flag>();
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(conn.get::<Flag>().is_none());
    }
}
