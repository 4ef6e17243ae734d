use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::{Mutex, MutexGuard};

/// Identity of one connected session. Nicknames are not unique, ids are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An active session as the registry sees it: who it is and where to write.
pub struct Member<W> {
    id: SessionId,
    nickname: String,
    writer: W,
}

impl<W> Member<W> {
    pub fn new(id: SessionId, nickname: impl Into<String>, writer: W) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            writer,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub(crate) fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// The set of sessions that currently receive broadcasts.
///
/// One mutex guards the member list. The broadcaster holds that same mutex
/// for the whole fan-out, so add, remove and other broadcasts wait until
/// every write of the current broadcast has finished or failed.
pub struct Registry<W> {
    members: Mutex<Vec<Member<W>>>,
    next_id: AtomicU64,
}

impl<W> Default for Registry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Registry<W> {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts `member`. Returns `false` without touching the set when a
    /// member with the same id is already registered.
    pub async fn add(&self, member: Member<W>) -> bool {
        let mut members = self.members.lock().await;
        if members.iter().any(|existing| existing.id == member.id) {
            return false;
        }
        members.push(member);
        true
    }

    /// Removes the member with `id`. Removing an absent id is a no-op.
    pub async fn remove(&self, id: SessionId) -> Option<Member<W>> {
        let mut members = self.members.lock().await;
        let index = members.iter().position(|member| member.id == id)?;
        // Keep the remaining delivery order stable.
        Some(members.remove(index))
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.members.lock().await.iter().any(|member| member.id == id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Nicknames in delivery order.
    pub async fn nicknames(&self) -> Vec<String> {
        self.members
            .lock()
            .await
            .iter()
            .map(|member| member.nickname.clone())
            .collect()
    }

    pub(crate) async fn lock_members(&self) -> MutexGuard<'_, Vec<Member<W>>> {
        self.members.lock().await
    }
}
