//! Rendering of announcements into Telegram HTML.

use chrono::{DateTime, Local, Utc};

use crate::{
    domain::{Announcement, Language},
    i18n::Localizer,
};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// Date + time in the subscriber's locale convention, in server-local time.
pub fn format_datetime(at: DateTime<Utc>, lang: Language) -> String {
    let local = at.with_timezone(&Local);
    match lang {
        Language::En => local.format("%b %-d, %Y %-I:%M %p").to_string(),
        Language::Fr => local.format("%d/%m/%Y %H:%M").to_string(),
        Language::Ar => local.format("%d/%m/%Y %H:%M").to_string(),
    }
}

pub fn format_date(at: DateTime<Utc>, lang: Language) -> String {
    let local = at.with_timezone(&Local);
    match lang {
        Language::En => local.format("%b %-d, %Y").to_string(),
        Language::Fr | Language::Ar => local.format("%d/%m/%Y").to_string(),
    }
}

/// Length as Telegram counts it (UTF-16 code units). Tags and entities are
/// counted too, so this overestimates the parsed length.
pub fn message_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// The broadcast message for one subscriber, split so that every part fits
/// in `max_len`. Only the body is ever split; the header stays in the first part.
pub fn render_announcement(
    i18n: &Localizer,
    lang: Language,
    a: &Announcement,
    max_len: usize,
) -> Vec<String> {
    let header = render_header(i18n, lang, a);
    let first_budget = max_len.saturating_sub(message_len(&header));
    let mut chunks = split_escaped(&a.body, first_budget, max_len).into_iter();

    let mut parts = vec![format!("{header}{}", chunks.next().unwrap_or_default())];
    parts.extend(chunks);
    parts
}

fn render_header(i18n: &Localizer, lang: Language, a: &Announcement) -> String {
    let cat = a.category;
    format!(
        "{emoji} <b>{header}</b>\n\n<b>{title_label}:</b> {title}\n<b>{cat_label}:</b> {cat_name} #{tag}\n<b>{posted_label}:</b> {posted}\n\n",
        emoji = cat.emoji(),
        header = escape_html(&i18n.text(lang, "new_announcement")),
        title_label = escape_html(&i18n.text(lang, "label_title")),
        title = escape_html(&a.title),
        cat_label = escape_html(&i18n.text(lang, "label_category")),
        cat_name = escape_html(&i18n.category_label(lang, cat)),
        tag = cat.tag(),
        posted_label = escape_html(&i18n.text(lang, "label_posted")),
        posted = format_datetime(a.created_at, lang),
    )
}

/// HTML-escape `text` into chunks of at most `first` (then `rest`) units,
/// breaking after whitespace where possible and never inside an entity.
fn split_escaped(text: &str, first: usize, rest: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut len = 0;
    let mut budget = first;

    for word in text.split_inclusive(char::is_whitespace) {
        let escaped = escape_html(word);
        let word_len = message_len(&escaped);
        if len + word_len > budget && len > 0 {
            chunks.push(std::mem::take(&mut current));
            len = 0;
            budget = rest;
        }
        if len + word_len <= budget {
            current.push_str(&escaped);
            len += word_len;
            continue;
        }

        // A single word longer than a whole message is cut per character.
        for c in word.chars() {
            let piece = escape_html(c.encode_utf8(&mut [0; 4]));
            let piece_len = message_len(&piece);
            if len + piece_len > budget && len > 0 {
                chunks.push(std::mem::take(&mut current));
                len = 0;
                budget = rest;
            }
            current.push_str(&piece);
            len += piece_len;
        }
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Plain-text caption attached to every file of a broadcast.
pub fn attachment_caption(
    i18n: &Localizer,
    lang: Language,
    a: &Announcement,
    max_len: usize,
) -> String {
    let caption = i18n.text_with(lang, "attachment_caption", &[("title", &a.title)]);
    truncate_text(&caption, max_len.saturating_sub(3))
}

/// One entry of a listing (`/announcements`, `/search`).
pub fn render_listing_entry(i18n: &Localizer, lang: Language, a: &Announcement) -> String {
    format!(
        "{emoji} <b>{title}</b>\n{id_label}: <code>{id}</code> · #{tag}\n{date_label}: {date}\n{body}",
        emoji = a.category.emoji(),
        title = escape_html(&a.title),
        id_label = escape_html(&i18n.text(lang, "label_id")),
        id = a.id,
        tag = a.category.tag(),
        date_label = escape_html(&i18n.text(lang, "label_date")),
        date = format_date(a.created_at, lang),
        body = escape_html(&truncate_text(&a.body, 300)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnnouncementId, Category, SubscriberId};

    fn sample() -> Announcement {
        Announcement {
            id: AnnouncementId(3),
            title: "Lab <closed>".to_string(),
            body: "The lab is closed on Friday & Saturday.".to_string(),
            category: Category::Important,
            attachments: vec![],
            created_by: SubscriberId::new("1"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn rendered_message_is_localized_and_escaped() {
        let i18n = Localizer::default();
        let a = sample();

        let en = render_announcement(&i18n, Language::En, &a, 4096);
        assert_eq!(en.len(), 1);
        let en = &en[0];
        assert!(en.starts_with("⚠️ <b>New Announcement</b>"));
        assert!(en.contains("Lab &lt;closed&gt;"));
        assert!(en.contains("#important"));
        assert!(en.contains("Friday &amp; Saturday"));

        let fr = render_announcement(&i18n, Language::Fr, &a, 4096).join("");
        assert!(fr.contains("Nouvelle annonce"));
        assert!(fr.contains("#important"));
    }

    #[test]
    fn long_bodies_are_split_to_fit_the_message_limit() {
        let i18n = Localizer::default();
        let mut a = sample();
        a.body = "Schedule & rooms: ".repeat(600) + &"x".repeat(5000);

        let parts = render_announcement(&i18n, Language::En, &a, 4096);
        assert!(parts.len() > 2);
        assert!(parts[0].starts_with("⚠️ <b>New Announcement</b>"));
        for p in &parts {
            assert!(message_len(p) <= 4096, "part of {} units", message_len(p));
            assert_eq!(crate::testing::telegram_html_error(p), None);
        }
        let rebuilt: String = parts[1..].concat();
        assert!(rebuilt.ends_with(&"x".repeat(100)));
        assert_eq!(
            parts.concat().matches("&amp;").count(),
            600,
            "no entity was cut in half"
        );
    }

    #[test]
    fn caption_references_title_and_respects_limit() {
        let i18n = Localizer::default();
        let mut a = sample();
        assert_eq!(
            attachment_caption(&i18n, Language::En, &a, 1024),
            "📎 Attachment: Lab <closed>"
        );

        a.title = "x".repeat(2000);
        let c = attachment_caption(&i18n, Language::En, &a, 1024);
        assert!(c.chars().count() <= 1024);
        assert!(c.ends_with("..."));
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate_text("héllo", 10), "héllo");
        assert_eq!(truncate_text("héllo", 2), "hé...");
    }
}
