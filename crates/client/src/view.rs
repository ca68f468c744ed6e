use std::collections::BTreeMap;

use advance_core::{ActiveUser, FieldKind, UserId};

use crate::autosave::SaveStatus;

/// The presentation layer as the sync components see it: a set of keyed
/// controls plus a few status surfaces. A browser binding implements this
/// over the DOM; [`MemoryView`] implements it over plain data.
pub trait FieldView {
    /// Kind of the control bound to `key`, or `None` if the page has no
    /// such control.
    fn field_kind(&self, key: &str) -> Option<FieldKind>;

    /// Displayed value in wire form (`"true"`/`"false"` for checkboxes).
    fn read_value(&self, key: &str) -> Option<String>;

    fn write_value(&mut self, key: &str, value: &str);

    /// Start the transient "updated by someone else" marker.
    fn mark_updated(&mut self, key: &str);

    fn clear_updated(&mut self, key: &str);

    /// Re-evaluate the visibility of every control that depends on `key`.
    fn recompute_visibility(&mut self, key: &str);

    fn show_notice(&mut self, message: &str);

    fn clear_notice(&mut self);

    fn set_status(&mut self, status: &SaveStatus);

    fn show_banner(&mut self, message: &str);

    fn hide_banner(&mut self);

    /// Other collaborators on this show, own entry already removed.
    fn render_presence(&mut self, others: &[ActiveUser]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryField {
    pub kind: FieldKind,
    pub value: String,
    /// `(field, value)`: shown only while `field` currently equals `value`.
    pub visible_when: Option<(String, String)>,
    pub visible: bool,
    pub updated: bool,
    /// How many times the updated marker has been started.
    pub flashes: u32,
}

/// Headless [`FieldView`] used by tests and the harness.
#[derive(Debug, Clone, Default)]
pub struct MemoryView {
    fields: BTreeMap<String, MemoryField>,
    pub notice: Option<String>,
    pub notices_shown: u32,
    pub status: SaveStatus,
    pub banner: Option<String>,
    pub banners_shown: u32,
    pub presence: Vec<ActiveUser>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: &str, kind: FieldKind) -> Self {
        self.add_field(key, kind, None);
        self
    }

    pub fn with_conditional_field(
        mut self,
        key: &str,
        kind: FieldKind,
        depends_on: &str,
        shown_for: &str,
    ) -> Self {
        self.add_field(key, kind, Some((depends_on.to_string(), shown_for.to_string())));
        self
    }

    fn add_field(&mut self, key: &str, kind: FieldKind, visible_when: Option<(String, String)>) {
        self.fields.insert(
            key.to_string(),
            MemoryField {
                kind,
                value: kind.normalize(""),
                visible_when,
                visible: true,
                updated: false,
                flashes: 0,
            },
        );
        self.recompute_all();
    }

    pub fn field(&self, key: &str) -> Option<&MemoryField> {
        self.fields.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|f| f.value.as_str())
    }

    /// Local typing: changes the value without any sync marker.
    pub fn type_value(&mut self, key: &str, value: &str) {
        self.write_value(key, value);
        self.recompute_visibility(key);
    }

    /// Fields each collaborator currently has focused, keyed by field.
    pub fn remote_focus(&self) -> BTreeMap<&str, Vec<UserId>> {
        let mut markers: BTreeMap<&str, Vec<UserId>> = BTreeMap::new();
        for user in &self.presence {
            if let Some(field) = user.focused_field.as_deref()
                && self.fields.contains_key(field)
            {
                markers.entry(field).or_default().push(user.user_id);
            }
        }
        markers
    }

    fn recompute_all(&mut self) {
        let keys: Vec<String> = self.fields.keys().cloned().collect();
        for key in keys {
            self.recompute_visibility(&key);
        }
    }
}

impl FieldView for MemoryView {
    fn field_kind(&self, key: &str) -> Option<FieldKind> {
        self.fields.get(key).map(|f| f.kind)
    }

    fn read_value(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|f| f.value.clone())
    }

    fn write_value(&mut self, key: &str, value: &str) {
        if let Some(field) = self.fields.get_mut(key) {
            field.value = field.kind.normalize(value);
        }
    }

    fn mark_updated(&mut self, key: &str) {
        if let Some(field) = self.fields.get_mut(key) {
            field.updated = true;
            field.flashes += 1;
        }
    }

    fn clear_updated(&mut self, key: &str) {
        if let Some(field) = self.fields.get_mut(key) {
            field.updated = false;
        }
    }

    fn recompute_visibility(&mut self, key: &str) {
        let Some(current) = self.fields.get(key).map(|f| f.value.clone()) else {
            return;
        };
        for field in self.fields.values_mut() {
            if let Some((depends_on, shown_for)) = &field.visible_when
                && depends_on == key
            {
                field.visible = *shown_for == current;
            }
        }
    }

    fn show_notice(&mut self, message: &str) {
        self.notice = Some(message.to_string());
        self.notices_shown += 1;
    }

    fn clear_notice(&mut self) {
        self.notice = None;
    }

    fn set_status(&mut self, status: &SaveStatus) {
        self.status = status.clone();
    }

    fn show_banner(&mut self, message: &str) {
        self.banner = Some(message.to_string());
        self.banners_shown += 1;
    }

    fn hide_banner(&mut self) {
        self.banner = None;
    }

    fn render_presence(&mut self, others: &[ActiveUser]) {
        self.presence = others.to_vec();
    }
}
