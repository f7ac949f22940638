//! Impersonation ("tunnel") sessions.
//!
//! An operator may view the product as another principal for support work.
//! Sessions are exclusive per actor, require a justification, and are written
//! to the audit log before they become active. A session ends explicitly or
//! when its TTL passes; expiry is detected lazily on the next access and is
//! audited like an explicit end.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_auth::{
    resolve, EffectivePermission, ModuleCatalog, PermissionQuery, Principal, SimulationError, SimulationReport,
    SimulationSubject, Simulator,
};
use hrgate_core::{PrincipalId, SessionId};

use crate::audit::{AuditError, AuditSink, SessionEnd, SessionRecord};
use crate::policy_store::{PolicyStore, PolicyStoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationSession {
    pub id: SessionId,
    pub actor: PrincipalId,
    pub target: Principal,
    pub justification: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ImpersonationSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn record(&self, ended_at: Option<DateTime<Utc>>, end: Option<SessionEnd>) -> SessionRecord {
        SessionRecord {
            session_id: self.id,
            target: self.target.clone(),
            justification: self.justification.clone(),
            started_at: self.started_at,
            ended_at,
            end,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImpersonationError {
    #[error("a justification is required to impersonate")]
    MissingJustification,

    #[error("'{0}' cannot impersonate themselves")]
    SelfImpersonation(PrincipalId),

    #[error("'{actor}' already has an active session ({session_id})")]
    AlreadyActive { actor: PrincipalId, session_id: SessionId },

    #[error("'{0}' has no active impersonation session")]
    NoActiveSession(PrincipalId),

    #[error("session ttl is out of range: {0:?}")]
    InvalidTtl(Duration),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Store(#[from] PolicyStoreError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("session registry unavailable: {0}")]
    Storage(String),
}

/// Owns the active sessions and their audit trail.
#[derive(Debug)]
pub struct ImpersonationManager<S, A> {
    store: S,
    audit: A,
    ttl: Duration,
    sessions: RwLock<HashMap<PrincipalId, ImpersonationSession>>,
}

impl<S, A> ImpersonationManager<S, A>
where
    S: PolicyStore,
    A: AuditSink,
{
    pub fn new(store: S, audit: A, ttl: Duration) -> Result<Self, ImpersonationError> {
        TimeDelta::from_std(ttl).map_err(|_| ImpersonationError::InvalidTtl(ttl))?;
        Ok(Self {
            store,
            audit,
            ttl,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn start(
        &self,
        actor: &PrincipalId,
        target: Principal,
        justification: &str,
    ) -> Result<ImpersonationSession, ImpersonationError> {
        self.start_at(actor, target, justification, Utc::now())
    }

    /// Start a session as of `now`. The audit entry is written first; if it
    /// fails, no session exists afterwards.
    pub fn start_at(
        &self,
        actor: &PrincipalId,
        target: Principal,
        justification: &str,
        now: DateTime<Utc>,
    ) -> Result<ImpersonationSession, ImpersonationError> {
        let justification = justification.trim();
        if justification.is_empty() {
            return Err(ImpersonationError::MissingJustification);
        }
        if &target.id == actor {
            return Err(ImpersonationError::SelfImpersonation(actor.clone()));
        }

        let mut sessions = self.sessions_mut()?;
        if let Some(existing) = sessions.get(actor) {
            if !existing.is_expired(now) {
                return Err(ImpersonationError::AlreadyActive {
                    actor: actor.clone(),
                    session_id: existing.id,
                });
            }
            let expired = existing.clone();
            self.close(&mut sessions, &expired, now, SessionEnd::TimedOut)?;
        }

        let expires_at = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(ImpersonationError::InvalidTtl(self.ttl))?;
        let session = ImpersonationSession {
            id: SessionId::new(),
            actor: actor.clone(),
            target,
            justification: justification.to_string(),
            started_at: now,
            expires_at,
        };
        self.audit
            .record_impersonation_session(actor, session.record(None, None))
            .map_err(|err| {
                tracing::error!(actor = %actor, error = %err, "impersonation audit failed; session not started");
                err
            })?;
        sessions.insert(actor.clone(), session.clone());

        tracing::info!(
            actor = %actor,
            target = %session.target.id,
            session_id = %session.id,
            expires_at = %session.expires_at,
            "impersonation session started"
        );
        Ok(session)
    }

    pub fn end(&self, actor: &PrincipalId) -> Result<ImpersonationSession, ImpersonationError> {
        self.end_at(actor, Utc::now())
    }

    /// End the actor's session. An already expired session is closed as timed out.
    pub fn end_at(&self, actor: &PrincipalId, now: DateTime<Utc>) -> Result<ImpersonationSession, ImpersonationError> {
        let mut sessions = self.sessions_mut()?;
        let session = sessions
            .get(actor)
            .cloned()
            .ok_or_else(|| ImpersonationError::NoActiveSession(actor.clone()))?;
        let end = if session.is_expired(now) {
            SessionEnd::TimedOut
        } else {
            SessionEnd::Ended
        };
        self.close(&mut sessions, &session, now, end)?;
        Ok(session)
    }

    pub fn active(&self, actor: &PrincipalId) -> Result<ImpersonationSession, ImpersonationError> {
        self.active_at(actor, Utc::now())
    }

    /// The actor's live session, expiring it first if its TTL has passed.
    pub fn active_at(&self, actor: &PrincipalId, now: DateTime<Utc>) -> Result<ImpersonationSession, ImpersonationError> {
        let mut sessions = self.sessions_mut()?;
        let session = sessions
            .get(actor)
            .cloned()
            .ok_or_else(|| ImpersonationError::NoActiveSession(actor.clone()))?;
        if session.is_expired(now) {
            self.close(&mut sessions, &session, now, SessionEnd::TimedOut)?;
            return Err(ImpersonationError::NoActiveSession(actor.clone()));
        }
        Ok(session)
    }

    /// Resolve one query as the impersonated target.
    pub fn resolve_as(
        &self,
        actor: &PrincipalId,
        query: &PermissionQuery,
        now: DateTime<Utc>,
    ) -> Result<EffectivePermission, ImpersonationError> {
        let session = self.active_at(actor, now)?;
        let snapshot = self.store.snapshot()?;
        Ok(resolve(&snapshot, &session.target, query))
    }

    /// Full simulation for the impersonated target.
    pub fn simulate_as(
        &self,
        actor: &PrincipalId,
        catalog: &ModuleCatalog,
        deadline: Duration,
        now: DateTime<Utc>,
    ) -> Result<SimulationReport, ImpersonationError> {
        let session = self.active_at(actor, now)?;
        let snapshot = self.store.snapshot()?;
        let subject = SimulationSubject::Impersonated {
            principal: session.target,
        };
        Ok(Simulator::new(&snapshot, catalog)
            .with_deadline(deadline)
            .simulate(&subject)?)
    }

    fn sessions_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PrincipalId, ImpersonationSession>>, ImpersonationError> {
        self.sessions
            .write()
            .map_err(|_| ImpersonationError::Storage("lock poisoned".to_string()))
    }

    /// Audit the end of `session`, then drop it. On audit failure the session
    /// stays registered (still unusable once expired) and the error surfaces.
    fn close(
        &self,
        sessions: &mut HashMap<PrincipalId, ImpersonationSession>,
        session: &ImpersonationSession,
        now: DateTime<Utc>,
        end: SessionEnd,
    ) -> Result<(), ImpersonationError> {
        let ended_at = match end {
            SessionEnd::TimedOut => session.expires_at,
            SessionEnd::Ended => now,
        };
        self.audit
            .record_impersonation_session(&session.actor, session.record(Some(ended_at), Some(end)))
            .map_err(|err| {
                tracing::error!(actor = %session.actor, session_id = %session.id, error = %err, "impersonation end audit failed");
                err
            })?;
        sessions.remove(&session.actor);

        tracing::info!(
            actor = %session.actor,
            target = %session.target.id,
            session_id = %session.id,
            end = ?end,
            "impersonation session ended"
        );
        Ok(())
    }
}
