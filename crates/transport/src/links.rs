//! Use-case links as a reconcilable membership set.

use async_trait::async_trait;
use convergence::{CancellationToken, EntityId, MemberId, MembershipOps, TransportError};
use serde::de::IgnoredAny;
use serde::Serialize;

use crate::client::Client;

/// Empty JSON object sent when creating a link.
#[derive(Debug, Serialize)]
struct LinkRequest {}

/// Links between one entity and the use cases it belongs to.
///
/// Members are use-case IDs. The entity type is the singular remote name,
/// such as `dataset`, `deployment` or `application`.
#[derive(Debug, Clone)]
pub struct UseCaseLinks {
    client: Client,
    entity_type: String,
    entity_id: EntityId,
}

impl UseCaseLinks {
    pub fn new(client: Client, entity_type: impl Into<String>, entity_id: EntityId) -> Self {
        Self {
            client,
            entity_type: entity_type.into(),
            entity_id,
        }
    }

    fn path(&self, use_case: &MemberId) -> String {
        format!("/useCases/{use_case}/{}s/{}/", self.entity_type, self.entity_id)
    }
}

#[async_trait]
impl MembershipOps for UseCaseLinks {
    fn scope(&self) -> String {
        format!("use cases of {} {}", self.entity_type, self.entity_id)
    }

    async fn add(&self, member: &MemberId, cancel: &CancellationToken) -> Result<(), TransportError> {
        self.client
            .post::<_, IgnoredAny>(&self.path(member), &LinkRequest {}, cancel)
            .await
            .map(|_| ())
    }

    async fn remove(&self, member: &MemberId, cancel: &CancellationToken) -> Result<(), TransportError> {
        self.client.delete(&self.path(member), cancel).await
    }
}
