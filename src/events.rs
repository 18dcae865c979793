//! Change notifications shared between sessions and the view layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::PlanId;
use crate::planner::{PlanDeficits, PlanRequirementsResult};

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    Account,
    Plan,
}

/// A stored entity changed. `origin` identifies the session that wrote it,
/// if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUpdated {
    pub data_type: DataType,
    pub entity_id: i64,
    pub origin: Option<Uuid>,
}

/// Requirements of an edited plan and what its account still lacks for them.
#[derive(Debug, Clone)]
pub struct RequirementsUpdated {
    pub plan_id: PlanId,
    pub requirements: Arc<PlanRequirementsResult>,
    pub deficits: Arc<PlanDeficits>,
}

#[derive(Debug)]
pub struct EventBus {
    data_updated: broadcast::Sender<DataUpdated>,
    requirements_updated: broadcast::Sender<RequirementsUpdated>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (data_updated, _) = broadcast::channel(capacity);
        let (requirements_updated, _) = broadcast::channel(capacity);
        Self {
            data_updated,
            requirements_updated,
        }
    }

    pub fn subscribe_data(&self) -> broadcast::Receiver<DataUpdated> {
        self.data_updated.subscribe()
    }

    pub fn subscribe_requirements(&self) -> broadcast::Receiver<RequirementsUpdated> {
        self.requirements_updated.subscribe()
    }

    /// Returns the number of subscribers reached. Having none is not an error.
    pub fn publish_data(&self, event: DataUpdated) -> usize {
        tracing::debug!(
            "Publishing {:?} update for entity {}",
            event.data_type,
            event.entity_id
        );
        self.data_updated.send(event).unwrap_or(0)
    }

    pub fn publish_requirements(&self, event: RequirementsUpdated) -> usize {
        self.requirements_updated.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_data_updates() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe_data();
        let origin = Uuid::new_v4();

        let reached = bus.publish_data(DataUpdated {
            data_type: DataType::Plan,
            entity_id: 4,
            origin: Some(origin),
        });
        assert_eq!(reached, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data_type, DataType::Plan);
        assert_eq!(event.entity_id, 4);
        assert_eq!(event.origin, Some(origin));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        assert_eq!(
            bus.publish_data(DataUpdated {
                data_type: DataType::Account,
                entity_id: 1,
                origin: None,
            }),
            0
        );
    }
}
