//! Private channel roster operations: invite, kick, kick-all and the ban
//! cascade.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::commands::CharacterRef;
use crate::conn::{CharId, ConnectionHandle, Transport};
use crate::error::{MembershipError, TransportError};
use crate::hub::MessageSender;
use crate::scheduler::JobScheduler;
use crate::services::AccessService;

pub struct MembershipLifecycle {
    transport: Arc<dyn Transport>,
    access: Arc<dyn AccessService>,
    scheduler: Arc<dyn JobScheduler>,
    kick_all_delay: Duration,
}

impl MembershipLifecycle {
    pub fn new(
        transport: Arc<dyn Transport>,
        access: Arc<dyn AccessService>,
        scheduler: Arc<dyn JobScheduler>,
        kick_all_delay: Duration,
    ) -> Self {
        Self {
            transport,
            access,
            scheduler,
            kick_all_delay,
        }
    }

    /// Invite `char_id` unconditionally.
    pub async fn join(
        &self,
        char_id: CharId,
        conn: &ConnectionHandle,
    ) -> Result<(), TransportError> {
        self.transport.private_channel_invite(conn, char_id).await
    }

    /// Kick `char_id` unconditionally.
    pub async fn leave(
        &self,
        char_id: CharId,
        conn: &ConnectionHandle,
    ) -> Result<(), TransportError> {
        self.transport.private_channel_kick(conn, char_id).await
    }

    /// Invite `target` on behalf of `requester`, telling the target who
    /// invited them.
    pub async fn invite(
        &self,
        target: &CharacterRef,
        requester: &str,
        conn: &ConnectionHandle,
    ) -> Result<String, MembershipError> {
        let char_id = resolved(target)?;

        if self.transport.is_private_channel_member(conn, char_id).await {
            return Err(MembershipError::AlreadyMember {
                name: target.name.clone(),
            });
        }

        self.transport
            .send_private_message(
                conn,
                char_id,
                &format!(
                    "You have been invited to the private channel by <highlight>{requester}</highlight>."
                ),
                true,
            )
            .await?;
        self.transport.private_channel_invite(conn, char_id).await?;

        info!(target = %target.name, by = %requester, conn = %conn.id, "Invited to private channel");
        Ok(format!(
            "You have invited <highlight>{}</highlight> to the private channel.",
            target.name
        ))
    }

    /// Kick `target` if `requester` outranks them.
    pub async fn kick(
        &self,
        target: &CharacterRef,
        requester: &MessageSender,
        conn: &ConnectionHandle,
    ) -> Result<String, MembershipError> {
        let char_id = resolved(target)?;

        if !self.transport.is_private_channel_member(conn, char_id).await {
            return Err(MembershipError::NotMember {
                name: target.name.clone(),
            });
        }

        if !self
            .access
            .has_sufficient_access_level(requester.char_id, char_id)
            .await
        {
            return Err(MembershipError::InsufficientAccess {
                name: target.name.clone(),
            });
        }

        self.transport
            .send_private_message(
                conn,
                char_id,
                &format!(
                    "You have been kicked from the private channel by <highlight>{}</highlight>.",
                    requester.name
                ),
                true,
            )
            .await?;
        self.transport.private_channel_kick(conn, char_id).await?;

        info!(target = %target.name, by = %requester.name, conn = %conn.id, "Kicked from private channel");
        Ok(format!(
            "You have kicked <highlight>{}</highlight> from the private channel.",
            target.name
        ))
    }

    /// Warn the channel, then kick everyone once the delay has elapsed.
    ///
    /// The warning goes out immediately; the kick runs as a detached job that
    /// cannot be cancelled.
    pub async fn kick_all(
        &self,
        requester: &str,
        conn: &ConnectionHandle,
    ) -> Result<(), TransportError> {
        self.transport
            .send_private_channel_message(
                conn,
                &format!(
                    "Everyone will be kicked from this channel in {} seconds. [by <highlight>{requester}</highlight>]",
                    self.kick_all_delay.as_secs()
                ),
            )
            .await?;

        let transport = Arc::clone(&self.transport);
        let conn = conn.clone();
        self.scheduler.delayed_job(
            Box::pin(async move {
                match transport.private_channel_kick_all(&conn).await {
                    Ok(()) => info!(conn = %conn.id, "Kicked everyone from private channel"),
                    Err(e) => warn!(conn = %conn.id, error = %e, "Delayed kick-all failed"),
                }
            }),
            self.kick_all_delay,
        );
        Ok(())
    }

    /// Kick `char_id` from the private channel of every connection they are
    /// in. Best-effort: failures are logged and skipped. Returns the number of
    /// channels they were kicked from.
    pub async fn kick_from_all(&self, char_id: CharId) -> usize {
        let mut kicked = 0;
        for conn in self.transport.connections() {
            if !self.transport.is_private_channel_member(&conn, char_id).await {
                continue;
            }
            match self.transport.private_channel_kick(&conn, char_id).await {
                Ok(()) => kicked += 1,
                Err(e) => warn!(
                    char_id = %char_id,
                    conn = %conn.id,
                    error = %e,
                    "Failed to kick from private channel"
                ),
            }
        }
        kicked
    }
}

fn resolved(target: &CharacterRef) -> Result<CharId, MembershipError> {
    target
        .char_id
        .ok_or_else(|| MembershipError::CharacterNotFound {
            name: target.name.clone(),
        })
}
