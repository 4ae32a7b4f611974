//! Local view of the participants connected to the session.
//!
//! The [`PresenceTracker`] owns the presence set: participants keyed by id,
//! ordered by first join. Every recorded participant gets a
//! [`LeaveSubscription`] that forwards its leave signal into the tracker's
//! leave channel as a [`LeaveNotice`]; the owner drains that channel and calls
//! [`on_leave_signal`](PresenceTracker::on_leave_signal). Nothing is purged
//! without an explicit leave or a local [`clear`](PresenceTracker::clear).

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::MalformedNotification;
use crate::matchmaking::{JoinNotification, LeaveSignal};
use crate::protocol::ParticipantId;

/// One connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable identifier assigned by matchmaking.
    pub id: ParticipantId,
    /// Display name resolved from the peer's profile at join time.
    pub display_name: String,
}

impl Participant {
    /// Create a participant.
    pub fn new(id: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A fired leave signal, as delivered on the tracker's leave channel.
///
/// `generation` identifies the registration that fired. A participant who
/// joins again gets a new registration, so notices from the old one no longer
/// match and are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveNotice {
    /// Participant whose signal fired.
    pub id: ParticipantId,
    /// Registration the signal belonged to.
    pub generation: u64,
}

/// Handle to a participant's leave registration. Cancelled on drop.
#[derive(Debug)]
pub struct LeaveSubscription {
    generation: u64,
    task: JoinHandle<()>,
}

impl LeaveSubscription {
    fn spawn(
        notice: LeaveNotice,
        signal: LeaveSignal,
        tx: mpsc::UnboundedSender<LeaveNotice>,
    ) -> Self {
        let generation = notice.generation;
        let task = tokio::spawn(async move {
            if signal.fired().await {
                // The receiver is gone only when the tracker's owner has exited.
                let _ = tx.send(notice);
            }
        });
        Self { generation, task }
    }

    /// Stop listening for the leave.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for LeaveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What [`PresenceTracker::on_join`] did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRecord {
    /// A new participant was added.
    Inserted(Participant),
    /// The id was already present; its display name and leave registration
    /// were refreshed and its position kept.
    Refreshed(Participant),
    /// The notification was malformed and ignored.
    Dropped(MalformedNotification),
}

/// Authoritative local presence set.
///
/// Must be used from within a Tokio runtime: recording a join spawns the task
/// that waits for that participant's leave signal.
#[derive(Debug)]
pub struct PresenceTracker {
    members: BTreeMap<u64, Participant>,
    positions: HashMap<ParticipantId, u64>,
    subscriptions: HashMap<ParticipantId, LeaveSubscription>,
    next_position: u64,
    next_generation: u64,
    leave_tx: mpsc::UnboundedSender<LeaveNotice>,
}

impl PresenceTracker {
    /// Create an empty tracker and the channel on which fired leave signals
    /// arrive.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LeaveNotice>) {
        let (leave_tx, leave_rx) = mpsc::unbounded_channel();
        let tracker = Self {
            members: BTreeMap::new(),
            positions: HashMap::new(),
            subscriptions: HashMap::new(),
            next_position: 0,
            next_generation: 0,
            leave_tx,
        };
        (tracker, leave_rx)
    }

    /// Record a join and subscribe to the participant's leave signal.
    ///
    /// Never fails: malformed notifications are logged and returned as
    /// [`JoinRecord::Dropped`].
    pub fn on_join(&mut self, notification: JoinNotification) -> JoinRecord {
        let JoinNotification {
            id,
            profile,
            on_leave,
            ..
        } = notification;

        let Some(id) = id else {
            warn!("dropping join notification without participant id");
            return JoinRecord::Dropped(MalformedNotification::MissingId);
        };
        let Some(profile) = profile else {
            warn!(participant = %id, "dropping join notification without profile");
            return JoinRecord::Dropped(MalformedNotification::MissingProfile { id });
        };

        let participant = Participant::new(id.clone(), profile.name);
        let notice = LeaveNotice {
            id: id.clone(),
            generation: self.next_generation,
        };
        self.next_generation += 1;
        let subscription = LeaveSubscription::spawn(notice, on_leave, self.leave_tx.clone());
        // Replacing a subscription drops, and so cancels, the previous one.
        self.subscriptions.insert(id.clone(), subscription);

        if let Some(position) = self.positions.get(&id).copied() {
            debug!(participant = %id, "participant joined again, refreshing");
            self.members.insert(position, participant.clone());
            return JoinRecord::Refreshed(participant);
        }

        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(id.clone(), position);
        self.members.insert(position, participant.clone());
        debug!(participant = %id, name = %participant.display_name, "participant joined");
        JoinRecord::Inserted(participant)
    }

    /// Remove a participant by id.
    ///
    /// Idempotent: removing an absent id is a no-op and returns `None`.
    pub fn on_leave(&mut self, id: &str) -> Option<Participant> {
        let position = self.positions.remove(id)?;
        if let Some(subscription) = self.subscriptions.remove(id) {
            subscription.cancel();
        }
        let participant = self.members.remove(&position);
        debug!(participant = %id, "participant left");
        participant
    }

    /// Apply a fired leave signal.
    ///
    /// Acts only if the notice comes from the participant's current
    /// registration; a notice that was in flight when the participant joined
    /// again is stale and returns `None`.
    pub fn on_leave_signal(&mut self, notice: &LeaveNotice) -> Option<Participant> {
        let current = self.subscriptions.get(&notice.id)?.generation;
        if current != notice.generation {
            debug!(
                participant = %notice.id,
                stale = notice.generation,
                current,
                "ignoring leave from a replaced registration"
            );
            return None;
        }
        self.on_leave(&notice.id)
    }

    /// The earliest-joined participant still present.
    pub fn first_participant(&self) -> Option<&Participant> {
        self.members.values().next()
    }

    /// Look up a participant by id.
    pub fn get(&self, id: &str) -> Option<&Participant> {
        let position = self.positions.get(id)?;
        self.members.get(position)
    }

    /// Returns `true` if `id` is present.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Number of present participants.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if nobody is present.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Present participants in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.members.values()
    }

    /// Owned copy of the present participants in join order.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.iter().cloned().collect()
    }

    /// Local teardown: forget everyone and cancel all leave subscriptions.
    /// Returns how many participants were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.members.len();
        self.members.clear();
        self.positions.clear();
        self.subscriptions.clear();
        removed
    }
}
