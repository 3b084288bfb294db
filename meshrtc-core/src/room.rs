//! Room membership model

use crate::error::MeshRtcError;
use crate::identity::{ParticipantId, RoomId};
use serde::{Deserialize, Serialize};

/// Room membership and host designation
///
/// Members are kept in join order. The first member to join becomes host;
/// when the host leaves, the earliest remaining member takes over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Room identity
    pub id: RoomId,
    members: Vec<ParticipantId>,
    host: Option<ParticipantId>,
    /// Room creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: impl Into<RoomId>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
            host: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Add a member to the room
    pub fn join(&mut self, participant: ParticipantId) -> Result<(), MeshRtcError> {
        if self.contains(&participant) {
            return Err(MeshRtcError::ParticipantAlreadyExists {
                room_id: self.id.to_string(),
                participant_id: participant.to_string(),
            });
        }

        if self.host.is_none() {
            self.host = Some(participant.clone());
        }
        self.members.push(participant);
        Ok(())
    }

    /// Remove a member, transferring host if needed
    pub fn leave(&mut self, participant: &ParticipantId) -> Result<(), MeshRtcError> {
        let index = self
            .members
            .iter()
            .position(|member| member == participant)
            .ok_or_else(|| MeshRtcError::ParticipantNotFound {
                room_id: self.id.to_string(),
                participant_id: participant.to_string(),
            })?;
        self.members.remove(index);

        if self.host.as_ref() == Some(participant) {
            self.host = self.members.first().cloned();
            if let Some(host) = &self.host {
                tracing::debug!(room = %self.id, %host, "Host transferred");
            }
        }
        Ok(())
    }

    /// Whether the participant is a member
    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.members.contains(participant)
    }

    /// Members in join order
    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    /// Every member except `exclude`
    pub fn other_members(&self, exclude: &ParticipantId) -> Vec<ParticipantId> {
        self.members
            .iter()
            .filter(|member| *member != exclude)
            .cloned()
            .collect()
    }

    /// Current host, if the room has members
    pub fn host(&self) -> Option<&ParticipantId> {
        self.host.as_ref()
    }

    /// Whether the room has no members left
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }
}
