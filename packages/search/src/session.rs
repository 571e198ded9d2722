//! Guards against applying results from a superseded search.
//!
//! Every search takes a [`SearchTicket`] from the [`SearchSession`] when it
//! starts. When it finishes, its results are applied only if the session's
//! latest term still equals the ticket's term; a slow response for
//! "Leeds" arriving after the user switched to "York" is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Issued when a search starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    generation: u64,
    term: String,
}

impl SearchTicket {
    /// Sequence number of the search.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The term the search was started with.
    #[must_use]
    pub fn term(&self) -> &str {
        &self.term
    }
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    latest_term: Option<String>,
    delivered_term: Option<String>,
}

/// Tracks the latest search term and whether it already has results.
#[derive(Debug, Default)]
pub struct SearchSession {
    state: Mutex<SessionState>,
}

fn same_term(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl SearchSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new search for `term`.
    ///
    /// Switching to a different term forgets that the previous term had
    /// results.
    pub fn begin(&self, term: &str) -> SearchTicket {
        let mut state = self.lock();
        state.generation += 1;

        let switched = state
            .latest_term
            .as_deref()
            .is_none_or(|latest| !same_term(latest, term));
        if switched {
            state.delivered_term = None;
        }
        state.latest_term = Some(term.to_string());

        SearchTicket {
            generation: state.generation,
            term: term.to_string(),
        }
    }

    /// Whether results for `ticket` may still be applied.
    #[must_use]
    pub fn is_current(&self, ticket: &SearchTicket) -> bool {
        self.lock()
            .latest_term
            .as_deref()
            .is_some_and(|latest| same_term(latest, &ticket.term))
    }

    /// Records that `ticket`'s term produced results.
    pub fn mark_delivered(&self, ticket: &SearchTicket) {
        let mut state = self.lock();
        if state
            .latest_term
            .as_deref()
            .is_some_and(|latest| same_term(latest, &ticket.term))
        {
            state.delivered_term = Some(ticket.term.clone());
        }
    }

    /// Whether the ticket's term already has results on screen.
    #[must_use]
    pub fn has_results(&self, ticket: &SearchTicket) -> bool {
        self.lock()
            .delivered_term
            .as_deref()
            .is_some_and(|delivered| same_term(delivered, &ticket.term))
    }
}
