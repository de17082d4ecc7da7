//! Optimistic vote state per thread.
//!
//! A click updates the displayed state immediately and records a pending
//! request tagged with a per-thread sequence number. When a response comes
//! back it is applied only if no newer request for the same thread is still
//! in flight or already applied; otherwise it is discarded. A failed request
//! restores the state captured when it was issued, not whatever is on
//! display at the time.

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{ClientConfig, ClientError, HttpVoteApi, VoteApi};
use crate::models::{Direction, VoteSnapshot, VoteValue};

/// What the UI shows for one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientVoteView {
    pub votes: i64,
    pub vote: VoteValue,
}

impl ClientVoteView {
    /// Apply a click on `direction`. Mirrors the server's delta arithmetic:
    /// repeating a direction clears the vote, reversing moves the total by
    /// two.
    pub fn toggle(self, direction: Direction) -> Self {
        let step = direction.sign();

        if self.vote == direction.as_vote() {
            Self {
                votes: self.votes - step,
                vote: VoteValue::None,
            }
        } else if self.vote == VoteValue::None {
            Self {
                votes: self.votes + step,
                vote: direction.as_vote(),
            }
        } else {
            Self {
                votes: self.votes + step * 2,
                vote: direction.as_vote(),
            }
        }
    }
}

impl From<VoteSnapshot> for ClientVoteView {
    fn from(snapshot: VoteSnapshot) -> Self {
        Self {
            votes: snapshot.votes,
            vote: snapshot.vote,
        }
    }
}

/// A request that has been issued but not resolved.
#[derive(Debug)]
struct PendingVote {
    rollback: ClientVoteView,
    /// Request whose optimistic state `rollback` is; 0 if server-confirmed.
    basis: u64,
}

#[derive(Debug, Default)]
struct ThreadEntry {
    view: ClientVoteView,
    /// Request whose optimistic state is on display; 0 if server-confirmed.
    display_basis: u64,
    issued: u64,
    last_applied: u64,
    in_flight: BTreeMap<u64, PendingVote>,
}

/// Handle for one issued vote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTicket {
    pub thread_id: Uuid,
    pub seq: u64,
    pub requested: VoteValue,
    pub optimistic: ClientVoteView,
    pub rollback: ClientVoteView,
}

#[derive(Debug)]
pub enum VoteOutcome {
    /// The server's answer is now on display.
    Confirmed(ClientVoteView),
    /// The request failed and its pre-click state was restored.
    RolledBack {
        restored: ClientVoteView,
        error: ClientError,
    },
    /// A newer request owns the display; this response was dropped.
    Superseded,
}

pub struct OptimisticVoteController<A> {
    api: A,
    request_timeout: Duration,
    threads: Mutex<HashMap<Uuid, ThreadEntry>>,
}

impl OptimisticVoteController<HttpVoteApi> {
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(HttpVoteApi::new(config)?, config.request_timeout))
    }
}

impl<A: VoteApi> OptimisticVoteController<A> {
    pub fn new(api: A, request_timeout: Duration) -> Self {
        Self {
            api,
            request_timeout,
            threads: Mutex::new(HashMap::new()),
        }
    }

    fn threads(&self) -> MutexGuard<'_, HashMap<Uuid, ThreadEntry>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Replace a thread's displayed state with server-provided values.
    ///
    /// Requests issued before this call can no longer change the display.
    pub fn seed(&self, thread_id: Uuid, snapshot: VoteSnapshot) {
        let mut threads = self.threads();
        let entry = threads.entry(thread_id).or_default();
        entry.view = snapshot.into();
        entry.display_basis = 0;
        entry.last_applied = entry.issued;
    }

    /// Fetch the caller's vote and the thread total and display them.
    pub async fn load(&self, thread_id: Uuid) -> Result<ClientVoteView, ClientError> {
        let snapshot = self.bounded(self.api.fetch_score(thread_id)).await?;
        self.seed(thread_id, snapshot);
        Ok(snapshot.into())
    }

    pub fn view(&self, thread_id: Uuid) -> Option<ClientVoteView> {
        self.threads().get(&thread_id).map(|entry| entry.view)
    }

    /// Whether the display for `thread_id` includes unconfirmed state.
    pub fn is_pending(&self, thread_id: Uuid) -> bool {
        self.threads()
            .get(&thread_id)
            .is_some_and(|entry| !entry.in_flight.is_empty())
    }

    /// Apply a click locally and register the request that will confirm it.
    /// Never touches the network.
    pub fn begin_vote(
        &self,
        thread_id: Uuid,
        direction: Direction,
    ) -> Result<VoteTicket, ClientError> {
        let mut threads = self.threads();
        let entry = threads
            .get_mut(&thread_id)
            .ok_or(ClientError::UnknownThread(thread_id))?;

        let rollback = entry.view;
        let optimistic = rollback.toggle(direction);

        entry.issued += 1;
        let seq = entry.issued;
        entry.in_flight.insert(
            seq,
            PendingVote {
                rollback,
                basis: entry.display_basis,
            },
        );
        entry.view = optimistic;
        entry.display_basis = seq;

        Ok(VoteTicket {
            thread_id,
            seq,
            requested: optimistic.vote,
            optimistic,
            rollback,
        })
    }

    /// Send the ticket's vote and reconcile the display with the result.
    /// A timeout counts as a failure; nothing is retried.
    pub async fn dispatch(&self, ticket: VoteTicket) -> VoteOutcome {
        let result = self
            .bounded(self.api.cast_vote(ticket.thread_id, ticket.requested))
            .await;
        self.settle(&ticket, result)
    }

    fn settle(
        &self,
        ticket: &VoteTicket,
        result: Result<VoteSnapshot, ClientError>,
    ) -> VoteOutcome {
        let mut threads = self.threads();
        let Some(entry) = threads.get_mut(&ticket.thread_id) else {
            return VoteOutcome::Superseded;
        };
        let Some(pending) = entry.in_flight.remove(&ticket.seq) else {
            return VoteOutcome::Superseded;
        };

        let newer_in_flight = entry.in_flight.range(ticket.seq + 1..).next().is_some();
        if newer_in_flight || ticket.seq <= entry.last_applied {
            // Requests issued on top of this one's optimistic state now roll
            // back onto what it actually resolved to.
            let (resolved, basis) = match &result {
                Ok(snapshot) => (ClientVoteView::from(*snapshot), 0),
                Err(_) => (pending.rollback, pending.basis),
            };
            for later in entry
                .in_flight
                .values_mut()
                .filter(|later| later.basis == ticket.seq)
            {
                later.rollback = resolved;
                later.basis = basis;
            }

            tracing::debug!(
                thread_id = %ticket.thread_id,
                seq = ticket.seq,
                "Discarding superseded vote response"
            );
            return VoteOutcome::Superseded;
        }

        match result {
            Ok(snapshot) => {
                entry.view = snapshot.into();
                entry.display_basis = 0;
                entry.last_applied = ticket.seq;
                VoteOutcome::Confirmed(entry.view)
            }
            Err(error) => {
                entry.view = pending.rollback;
                entry.display_basis = pending.basis;
                tracing::warn!(
                    thread_id = %ticket.thread_id,
                    seq = ticket.seq,
                    %error,
                    "Vote failed, restored previous state"
                );
                VoteOutcome::RolledBack {
                    restored: pending.rollback,
                    error,
                }
            }
        }
    }

    /// Ask the server to reconcile the thread total and adopt its answer.
    /// Skipped while votes on the thread are still in flight.
    pub async fn resync(&self, thread_id: Uuid) -> Result<ClientVoteView, ClientError> {
        let reported = self
            .view(thread_id)
            .ok_or(ClientError::UnknownThread(thread_id))?
            .votes;
        let thread = self
            .bounded(self.api.sync_score(thread_id, reported))
            .await?;

        let mut threads = self.threads();
        let entry = threads
            .get_mut(&thread_id)
            .ok_or(ClientError::UnknownThread(thread_id))?;
        if entry.in_flight.is_empty() {
            entry.view.votes = thread.votes;
        }
        Ok(entry.view)
    }
}

impl<A: VoteApi + 'static> OptimisticVoteController<A> {
    /// Apply a click now and confirm it in the background.
    pub fn vote(
        self: &Arc<Self>,
        thread_id: Uuid,
        direction: Direction,
    ) -> Result<JoinHandle<VoteOutcome>, ClientError> {
        let ticket = self.begin_vote(thread_id, direction)?;
        let controller = Arc::clone(self);
        Ok(tokio::spawn(
            async move { controller.dispatch(ticket).await },
        ))
    }
}
