use std::collections::BTreeMap;

use advance_core::protocol::FieldMap;
use tracing::debug;

use crate::view::FieldView;

/// What one merge pass did with each incoming key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub applied: Vec<String>,
    pub unknown: Vec<String>,
    pub focused: Vec<String>,
    pub pending: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Applies inbound field deltas to a view without touching the field the
/// local user is typing in or any edit that is still waiting to be saved,
/// and owns the timers for the visual feedback it starts.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    flash_ms: u64,
    notice_ms: u64,
    flashes: BTreeMap<String, u64>,
    notice_until: Option<u64>,
}

impl MergeEngine {
    pub fn new(flash_ms: u64, notice_ms: u64) -> Self {
        Self {
            flash_ms,
            notice_ms,
            flashes: BTreeMap::new(),
            notice_until: None,
        }
    }

    pub fn apply<V: FieldView>(
        &mut self,
        view: &mut V,
        focused: Option<&str>,
        is_pending: impl Fn(&str) -> bool,
        delta: &FieldMap,
        now_ms: u64,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for (key, incoming) in delta {
            let Some(kind) = view.field_kind(key) else {
                outcome.unknown.push(key.clone());
                continue;
            };
            if focused == Some(key.as_str()) {
                outcome.focused.push(key.clone());
                continue;
            }
            // Unsaved local edit; its save supersedes the delta.
            if is_pending(key) {
                outcome.pending.push(key.clone());
                continue;
            }
            let displayed = view.read_value(key).unwrap_or_default();
            if kind.same_value(&displayed, incoming) {
                outcome.unchanged.push(key.clone());
                continue;
            }

            view.write_value(key, incoming);
            view.recompute_visibility(key);
            view.mark_updated(key);
            self.flashes.insert(key.clone(), now_ms + self.flash_ms);
            outcome.applied.push(key.clone());
        }

        if !outcome.applied.is_empty() {
            view.show_notice(&updated_notice(outcome.applied.len()));
            self.notice_until = Some(now_ms + self.notice_ms);
        }
        if !outcome.unknown.is_empty() || !outcome.focused.is_empty() || !outcome.pending.is_empty() {
            debug!(
                unknown = outcome.unknown.len(),
                focused = outcome.focused.len(),
                pending = outcome.pending.len(),
                "merge skipped fields"
            );
        }
        outcome
    }

    /// Clear markers and the notice whose time is up.
    pub fn expire<V: FieldView>(&mut self, view: &mut V, now_ms: u64) {
        self.flashes.retain(|key, until| {
            if *until <= now_ms {
                view.clear_updated(key);
                false
            } else {
                true
            }
        });
        if let Some(until) = self.notice_until
            && until <= now_ms
        {
            view.clear_notice();
            self.notice_until = None;
        }
    }

    pub fn flashing(&self) -> impl Iterator<Item = &str> {
        self.flashes.keys().map(String::as_str)
    }
}

fn updated_notice(count: usize) -> String {
    if count == 1 {
        "1 field updated".to_string()
    } else {
        format!("{count} fields updated")
    }
}
