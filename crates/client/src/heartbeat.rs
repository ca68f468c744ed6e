use advance_core::protocol::HeartbeatRequest;
use tracing::debug;

use crate::session::SessionContext;
use crate::transport::SyncTransport;
use crate::view::FieldView;

pub const OTHER_SAVED_NOTICE: &str =
    "Another user has saved changes to this show. Reload to see the latest.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    NotDue,
    /// Due, but this tab is live-synced and the poller covers it.
    Inactive,
    Reported { other_saved: bool, banner_shown: bool },
    Failed,
}

/// Low-frequency presence ping for tabs without field-level sync, which
/// also raises the "someone else saved" banner.
#[derive(Debug, Clone)]
pub struct HeartbeatPoller {
    interval_ms: u64,
    live_tab: String,
    next_due_ms: u64,
    /// `saved_at_ms` of the save the visible banner announces.
    banner_for: Option<u64>,
    /// `saved_at_ms` of the save the user last dismissed a banner for.
    dismissed_at: Option<u64>,
}

impl HeartbeatPoller {
    pub fn new(interval_ms: u64, live_tab: &str, start_ms: u64) -> Self {
        Self {
            interval_ms,
            live_tab: live_tab.to_string(),
            next_due_ms: start_ms,
            banner_for: None,
            dismissed_at: None,
        }
    }

    pub fn banner_visible(&self) -> bool {
        self.banner_for.is_some()
    }

    pub fn tick<T: SyncTransport, V: FieldView>(
        &mut self,
        now_ms: u64,
        session: &SessionContext,
        transport: &mut T,
        view: &mut V,
    ) -> HeartbeatOutcome {
        if now_ms < self.next_due_ms {
            return HeartbeatOutcome::NotDue;
        }
        self.next_due_ms = now_ms + self.interval_ms;
        if session.active_tab() == self.live_tab {
            return HeartbeatOutcome::Inactive;
        }

        let request = HeartbeatRequest {
            show_id: session.show_id,
            session: session.session,
            tab: session.active_tab().to_string(),
            focused_field: session.focus_param(),
            since_ms: session.started_at_ms(),
        };
        let response = match transport.heartbeat(&request) {
            Ok(response) => response,
            Err(e) => {
                debug!(show_id = %session.show_id, error = %e, "heartbeat failed");
                return HeartbeatOutcome::Failed;
            }
        };

        let others: Vec<_> = response
            .active_users
            .into_iter()
            .filter(|u| u.user_id != session.user.id)
            .collect();
        view.render_presence(&others);

        let saved_at = response.saved_at_ms.unwrap_or_default();
        let show = response.other_saved
            && self.banner_for.is_none()
            && !session.is_dirty()
            && self.dismissed_at.is_none_or(|dismissed| saved_at > dismissed);
        if show {
            view.show_banner(OTHER_SAVED_NOTICE);
            self.banner_for = Some(saved_at);
        }
        HeartbeatOutcome::Reported {
            other_saved: response.other_saved,
            banner_shown: show,
        }
    }

    /// The user closed the banner. It only comes back for a later save.
    pub fn dismiss<V: FieldView>(&mut self, view: &mut V) {
        if let Some(saved_at) = self.banner_for.take() {
            view.hide_banner();
            self.dismissed_at = Some(saved_at);
        }
    }
}
