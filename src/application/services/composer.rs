//! Turns a notification group into localised text.

use std::sync::Arc;

use crate::{
    application::services::i18n::{Catalog, interpolate},
    config::{NotificationSettings, Template},
    domain::{
        events::{DomainEvent, EventDetail, EventSubject},
        models::NotificationGroup,
    },
};

const SEPARATOR: &str = "━━━━━━━━━━━━━━━";

#[derive(Clone)]
pub struct MessageComposer {
    catalog: Arc<Catalog>,
    settings: Arc<NotificationSettings>,
}

impl MessageComposer {
    pub fn new(catalog: Arc<Catalog>, settings: Arc<NotificationSettings>) -> Self {
        Self { catalog, settings }
    }

    /// `None` means nothing should be sent for this language.
    pub fn compose(&self, group: &NotificationGroup, lang: &str) -> Option<String> {
        match group.events.as_slice() {
            [] => None,
            [event] => self.render_single(event, lang),
            events => Some(self.render_combined(&group.base_info, events, lang)),
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn action_label(&self, lang: &str) -> String {
        self.catalog.text("notification.view_attachment", lang, &[])
    }

    fn render_single(&self, event: &DomainEvent, lang: &str) -> Option<String> {
        let template = match self.settings.templates.get(&event.kind())? {
            Template::Catalog(key) => self.catalog.lookup(key, lang)?,
            Template::Text(text) => text.as_str(),
        };

        let subject = event.subject();
        let category_name = self.category_name(&subject.category);
        let mode_name = self.variant_name(&subject.variant, lang);

        let mut args: Vec<(&str, &str)> = vec![
            ("category", subject.category.as_str()),
            ("category_name", category_name.as_str()),
            ("weapon", subject.entity.as_str()),
            ("entity", subject.entity.as_str()),
            ("code", subject.code.as_str()),
            ("mode", subject.variant.as_str()),
            ("variant", subject.variant.as_str()),
            ("mode_name", mode_name.as_str()),
            ("name", subject.display_name.as_str()),
        ];
        args.extend(detail_args(event.detail()));

        match interpolate(template, &args) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(
                    event_kind = %event.kind(),
                    lang,
                    error = %err,
                    "Template could not be rendered, dropping notification"
                );
                None
            }
        }
    }

    fn render_combined(&self, base: &EventSubject, events: &[DomainEvent], lang: &str) -> String {
        let mode_name = self.variant_name(&base.variant, lang);
        let catalog = &self.catalog;

        let mut message = String::new();
        for line in [
            catalog.text("notification.combined.header", lang, &[]),
            catalog.text("notification.combined.weapon", lang, &[("weapon", base.entity.as_str())]),
            catalog.text(
                "notification.combined.attachment",
                lang,
                &[("name", base.display_name.as_str()), ("code", base.code.as_str())],
            ),
            catalog.text("notification.combined.mode", lang, &[("mode", mode_name.as_str())]),
            SEPARATOR.to_string(),
        ] {
            message.push_str(&line);
            message.push('\n');
        }

        let changes: Vec<String> = events
            .iter()
            .filter_map(|event| self.change_line(event, lang))
            .collect();
        if changes.is_empty() {
            return message;
        }

        message.push_str(&catalog.text("notification.combined.changes_header", lang, &[]));
        message.push('\n');
        for change in changes {
            message.push_str("• ");
            message.push_str(&change);
            message.push('\n');
        }
        message
    }

    /// Bullet line for one event; kinds without a catalog entry are skipped.
    fn change_line(&self, event: &DomainEvent, lang: &str) -> Option<String> {
        let key = format!("notification.change.{}", event.kind().as_str());
        self.catalog.lookup(&key, lang)?;
        Some(self.catalog.text(&key, lang, &detail_args(event.detail())))
    }

    fn category_name(&self, category: &str) -> String {
        self.settings
            .category_names
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.to_string())
    }

    fn variant_name(&self, variant: &str, lang: &str) -> String {
        let key = format!("mode.{variant}_short");
        if let Some(name) = self.catalog.lookup(&key, lang) {
            return name.to_string();
        }
        self.settings
            .variant_names
            .get(variant)
            .cloned()
            .unwrap_or_else(|| variant.to_string())
    }
}

fn detail_args(detail: &EventDetail) -> Vec<(&'static str, &str)> {
    match detail {
        EventDetail::Plain => Vec::new(),
        EventDetail::NameChanged { old_name, new_name } => {
            vec![("old_name", old_name.as_str()), ("new_name", new_name.as_str())]
        }
        EventDetail::CodeChanged { old_code, new_code } => {
            vec![("old_code", old_code.as_str()), ("new_code", new_code.as_str())]
        }
    }
}
