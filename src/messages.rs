//! Reminder message rendering.

use crate::channels::{PushMessage, TemplateMessage, TemplateParameter};
use crate::config::{PushChannelConfig, WhatsAppChannelConfig};
use crate::model::{ContactInfo, Task};
use chrono::{DateTime, FixedOffset, Offset, Utc};

const TITLE_PLACEHOLDER: &str = "{title}";

/// Render the push notification for `task`.
#[must_use]
pub fn push_message(config: &PushChannelConfig, task: &Task) -> PushMessage {
    PushMessage {
        title: config.title_template.replace(TITLE_PLACEHOLDER, &task.title),
        body: config.body_template.replace(TITLE_PLACEHOLDER, &task.title),
    }
}

/// Render the WhatsApp template for `task`.
///
/// Parameter order is fixed by the approved template: greeting, intro line,
/// local deadline date, task title, status.
#[must_use]
pub fn whatsapp_message(
    config: &WhatsAppChannelConfig,
    task: &Task,
    contact: &ContactInfo,
) -> TemplateMessage {
    let name = contact
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let greeting = match name {
        Some(name) => format!("Hola! {name}"),
        None => "Hola!".to_owned(),
    };
    let due = task
        .reminder_deadline
        .map(|deadline| local_date(deadline, config.utc_offset_minutes))
        .unwrap_or_default();

    TemplateMessage {
        name: config.template_name.clone(),
        language_code: config.language_code.clone(),
        parameters: vec![
            TemplateParameter::text(greeting),
            TemplateParameter::text(config.intro_line.clone()),
            TemplateParameter::text(due),
            TemplateParameter::text(task.title.clone()),
            TemplateParameter::text(task.status.as_str().to_uppercase()),
        ],
    }
}

/// `dd/mm/yyyy` in a fixed UTC offset; out-of-range offsets fall back to UTC.
fn local_date(at: DateTime<Utc>, utc_offset_minutes: i32) -> String {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    at.with_timezone(&offset).format("%d/%m/%Y").to_string()
}
