//! Set of live sessions used for broadcast fan-out and `LIST USERS`
//!
//! Each session owns the strong sender of its outbound queue; the registry
//! keeps only a weak handle. Dropping the session's sender therefore closes
//! the queue no matter what the registry holds, and the session's writer task
//! shuts the socket down exactly once when that happens.

use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError, WeakSender};

/// Stable identifier assigned to a connection on accept
pub type SessionId = u64;

/// Items queued for a session's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Complete wire text, terminators included
    Line(Arc<str>),
    /// Flush what is queued, then shut the socket down
    Close,
}

/// Owning end of a session's outbound queue
pub type SessionSink = mpsc::Sender<Outbound>;

#[derive(Clone)]
struct Member {
    peer: String,
    sink: WeakSender<Outbound>,
}

/// Registry of connected sessions, keyed and listed by [`SessionId`]
#[derive(Default)]
pub struct SessionRegistry {
    members: Mutex<BTreeMap<SessionId, Member>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SessionId, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out the next session id; ids start at 1 and are never reused
    pub fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Adds a session. Broadcasts started after this call will reach it.
    pub fn register(&self, id: SessionId, peer: &str, sink: &SessionSink) {
        let member = Member {
            peer: peer.to_string(),
            sink: sink.downgrade(),
        };
        let count = {
            let mut members = self.lock();
            members.insert(id, member);
            members.len()
        };
        info!("{} registered as session {} ({} online)", peer, id, count);
    }

    /// Removes a session. Returns false if it was already gone, so repeated
    /// calls on different exit paths are harmless.
    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(member) => {
                info!("{} unregistered session {}", member.peer, id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Peer addresses of all members in connection order
    pub fn peers(&self) -> Vec<String> {
        self.lock().values().map(|m| m.peer.clone()).collect()
    }

    /// Copies the sink handles so that writes happen without the lock held
    fn snapshot(&self) -> Vec<(SessionId, WeakSender<Outbound>)> {
        self.lock()
            .iter()
            .map(|(id, member)| (*id, member.sink.clone()))
            .collect()
    }

    /// Queues `line` for every member on a best-effort basis.
    ///
    /// A session whose queue is full or closed is skipped for this line and
    /// stays registered. Returns the number of sessions the line was queued for.
    pub fn broadcast(&self, line: &str) -> usize {
        let line: Arc<str> = Arc::from(line);
        let mut delivered = 0;

        for (id, sink) in self.snapshot() {
            let Some(sink) = sink.upgrade() else {
                continue;
            };
            match sink.try_send(Outbound::Line(Arc::clone(&line))) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => debug!("session {} outbox full, skipping", id),
                Err(TrySendError::Closed(_)) => debug!("session {} outbox closed, skipping", id),
            }
        }

        delivered
    }

    /// Empties the registry and asks every remaining writer to close its
    /// socket. Used on shutdown; returns how many sessions were removed.
    pub fn close_all(&self) -> usize {
        let members: Vec<(SessionId, Member)> =
            std::mem::take(&mut *self.lock()).into_iter().collect();

        for (id, member) in &members {
            if let Some(sink) = member.sink.upgrade() {
                if sink.try_send(Outbound::Close).is_err() {
                    debug!("session {} could not queue close", id);
                }
            }
        }

        members.len()
    }
}
