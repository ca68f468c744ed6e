use advance_core::protocol::PollRequest;
use tracing::debug;

use crate::merge::{MergeEngine, MergeOutcome};
use crate::session::SessionContext;
use crate::transport::SyncTransport;
use crate::view::FieldView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The interval has not elapsed yet.
    NotDue,
    /// Due, but this tab is not the live-synced one.
    Inactive,
    Merged(MergeOutcome),
    /// The request failed; the cursor was left where it was.
    Failed,
}

/// Fixed-interval delta loop for the live-synced tab.
///
/// The interval keeps running while another tab is shown; each due tick
/// just checks whether the session is on the live tab.
#[derive(Debug, Clone)]
pub struct SyncPoller {
    interval_ms: u64,
    live_tab: String,
    next_due_ms: u64,
    polls: u64,
}

impl SyncPoller {
    /// The first tick at or after `start_ms` polls immediately, seeding the
    /// cursor before the first interval elapses.
    pub fn new(interval_ms: u64, live_tab: &str, start_ms: u64) -> Self {
        Self {
            interval_ms,
            live_tab: live_tab.to_string(),
            next_due_ms: start_ms,
            polls: 0,
        }
    }

    pub fn next_due_ms(&self) -> u64 {
        self.next_due_ms
    }

    /// Completed or attempted polls so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn tick<T: SyncTransport, V: FieldView>(
        &mut self,
        now_ms: u64,
        session: &mut SessionContext,
        transport: &mut T,
        view: &mut V,
        merge: &mut MergeEngine,
        is_pending: impl Fn(&str) -> bool,
    ) -> PollOutcome {
        if now_ms < self.next_due_ms {
            return PollOutcome::NotDue;
        }
        self.next_due_ms = now_ms + self.interval_ms;
        if session.active_tab() != self.live_tab {
            return PollOutcome::Inactive;
        }
        self.polls += 1;

        let request = PollRequest {
            show_id: session.show_id,
            session: session.session,
            since: session.cursor().to_string(),
            tab: session.active_tab().to_string(),
            focused_field: session.focus_param(),
        };
        let response = match transport.poll_delta(&request) {
            Ok(response) => response,
            Err(e) => {
                debug!(show_id = %session.show_id, error = %e, "poll failed, retrying next interval");
                return PollOutcome::Failed;
            }
        };

        session.advance_cursor(response.cursor);
        let outcome = merge.apply(
            view,
            session.focused_field(),
            is_pending,
            &response.fields,
            now_ms,
        );
        let others: Vec<_> = response
            .active_users
            .into_iter()
            .filter(|u| u.user_id != session.user.id)
            .collect();
        view.render_presence(&others);
        PollOutcome::Merged(outcome)
    }
}
