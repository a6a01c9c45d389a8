//! Meeting emails and Meet-style links.

use chrono::FixedOffset;
use rand::Rng;

use asis_core::types::CalendarEvent;

use crate::services::OutgoingEmail;

const STYLE: &str = "body { font-family: Arial, sans-serif; color: #333; } \
.container { max-width: 600px; margin: 0 auto; padding: 20px; } \
.header { background: #4285f4; color: white; padding: 16px; border-radius: 8px 8px 0 0; } \
.details { background: #f8f9fa; padding: 16px; border-radius: 0 0 8px 8px; } \
.meet-button { display: inline-block; background: #4285f4; color: white; padding: 12px 24px; text-decoration: none; border-radius: 5px; margin: 15px 0; }";

/// A link of the form `https://meet.google.com/xxx-xxxx-xxx`.
pub fn meet_link() -> String {
    let mut rng = rand::rng();
    let mut segment = |len: usize| -> String {
        (0..len)
            .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
            .collect()
    };
    let (a, b, c) = (segment(3), segment(4), segment(3));
    format!("https://meet.google.com/{}-{}-{}", a, b, c)
}

/// HTML invitation sent to the attendee.
pub fn invitation_email(event: &CalendarEvent, to: &str, offset: FixedOffset) -> OutgoingEmail {
    let greeting = match event.attendee_name.as_deref() {
        Some(name) if !name.trim().is_empty() => format!("Dragă {},", escape_html(name.trim())),
        _ => "Bună ziua,".to_string(),
    };

    let body = format!(
        "<html><head><meta charset=\"utf-8\"><style>{style}</style></head><body>\
<div class=\"container\">\
<div class=\"header\"><h2>📅 Invitație la întâlnire</h2></div>\
<div class=\"details\">\
<p>{greeting}</p>\
<p>Ai fost invitat(ă) la o întâlnire!</p>\
{details}\
{link}\
<p>Te rog să confirmi participarea ta răspunzând la acest email.</p>\
<p>Cu respect,<br>Asistentul Personal AI</p>\
</div></div></body></html>",
        style = STYLE,
        greeting = greeting,
        details = detail_rows(event, offset, false),
        link = meet_button(event, "🎥 Intră în Google Meet"),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Invitație la întâlnire: {}", event.title),
        body,
        is_html: true,
    }
}

/// HTML confirmation copy sent to the user's own address.
pub fn confirmation_email(event: &CalendarEvent, to: &str, offset: FixedOffset) -> OutgoingEmail {
    let invited = if event.attendee_email.is_some() {
        "Întâlnirea ta a fost creată și invitația a fost trimisă."
    } else {
        "Întâlnirea ta a fost creată."
    };

    let body = format!(
        "<html><head><meta charset=\"utf-8\"><style>{style}</style></head><body>\
<div class=\"container\">\
<div class=\"header\"><h2>✅ Întâlnire programată cu succes!</h2></div>\
<div class=\"details\">\
<p>Salut!</p>\
<p>{invited}</p>\
{details}\
{link}\
<p>Cu respect,<br>Asistentul Personal AI</p>\
</div></div></body></html>",
        style = STYLE,
        invited = invited,
        details = detail_rows(event, offset, true),
        link = meet_button(event, "🎥 Link Google Meet"),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("✅ Întâlnire programată: {}", event.title),
        body,
        is_html: true,
    }
}

fn detail_rows(event: &CalendarEvent, offset: FixedOffset, with_attendee: bool) -> String {
    let start = event.start_time.with_timezone(&offset);
    let end = event.end_time.with_timezone(&offset);

    let mut rows = format!(
        "<p>📌 <strong>Titlu:</strong> {}</p>\
<p>📅 <strong>Data:</strong> {}</p>\
<p>⏰ <strong>Ora:</strong> {} - {}</p>",
        escape_html(&event.title),
        start.format("%d.%m.%Y"),
        start.format("%H:%M"),
        end.format("%H:%M"),
    );

    if with_attendee {
        let attendee = match (event.attendee_name.as_deref(), event.attendee_email.as_deref()) {
            (Some(name), Some(email)) => Some(format!("{} ({})", name, email)),
            (None, Some(email)) => Some(email.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        };
        if let Some(attendee) = attendee {
            rows.push_str(&format!(
                "<p>👤 <strong>Participant:</strong> {}</p>",
                escape_html(&attendee)
            ));
        }
    }

    if let Some(ref description) = event.description {
        rows.push_str(&format!(
            "<p>📝 <strong>Descriere:</strong> {}</p>",
            escape_html(description)
        ));
    }
    rows
}

fn meet_button(event: &CalendarEvent, label: &str) -> String {
    match event.meet_link.as_deref() {
        Some(link) => format!(
            "<p><a href=\"{}\" class=\"meet-button\">{}</a></p>",
            escape_html(link),
            label
        ),
        None => String::new(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
