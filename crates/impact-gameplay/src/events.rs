//! Event bus carrying impact notifications to external listeners.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use glam::Vec3;
use impact_common::{ColliderId, EntityId, SourceId};
use tracing::warn;

use crate::collision_data::ImpactCollisionData;

/// Payload of a ricochet: where a chained impact could go next.
#[derive(Debug, Clone, PartialEq)]
pub struct RicochetData {
    /// Copy of the hit that produced the ricochet.
    pub source: ImpactCollisionData,
    /// Candidate collider the ricochet points at.
    pub collider: ColliderId,
    /// Normalized direction from the contact point to the candidate.
    pub direction: Vec3,
    /// Chain index for the source (1 for the first ricochet).
    pub chain_index: u32,
}

/// Why an attack stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The weapon struck solid world geometry.
    SolidObject,
    /// The hit was blocked by a shield.
    ShieldBlock,
}

/// Events produced while resolving impacts.
#[derive(Debug, Clone, PartialEq)]
pub enum ImpactEvent {
    /// A ricochet candidate was found
    Ricochet(RicochetData),
    /// A swing was cut short
    AttackStopped {
        /// Attacking character
        attacker: EntityId,
        /// Why it stopped
        reason: StopReason,
        /// Collider that stopped it
        collider: ColliderId,
    },
    /// Named event raised by an action
    Named {
        /// Event name
        name: String,
        /// Source of the impact
        source_id: SourceId,
        /// Struck entity
        target: Option<EntityId>,
    },
}

/// Event bus for broadcasting impact events.
#[derive(Debug)]
pub struct ImpactEventBus {
    /// Sender for broadcasting events
    sender: Sender<ImpactEvent>,
    /// Receiver for collecting events
    receiver: Receiver<ImpactEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for ImpactEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ImpactEventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            capacity: capacity.max(1),
        }
    }

    /// Publishes an event. Returns `false` if it was dropped.
    pub fn publish(&self, event: ImpactEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Impact event bus full ({}), dropping {:?}", self.capacity, event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<ImpactEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<ImpactEvent> {
        self.sender.clone()
    }
}
