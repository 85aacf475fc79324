use crate::{
    domain::{Attachment, Category, NewAnnouncement, SubscriberId},
    errors::ValidationError,
};

pub const MIN_TITLE_CHARS: usize = 3;
pub const MIN_BODY_CHARS: usize = 10;

/// Raw announcement fields as collected from a conversation or an HTTP body.
#[derive(Clone, Debug, Default)]
pub struct AnnouncementInput<'a> {
    pub title: Option<&'a str>,
    pub body: Option<&'a str>,
    pub tag: Option<&'a str>,
}

/// Apply the announcement invariants, in order: title, body, category.
///
/// The title is stored trimmed. Lengths are counted in characters, not bytes,
/// so non-Latin titles are measured fairly.
pub fn validate(
    input: AnnouncementInput<'_>,
    attachments: Vec<Attachment>,
    created_by: SubscriberId,
) -> Result<NewAnnouncement, ValidationError> {
    let title = input.title.map(str::trim).unwrap_or_default();
    if title.chars().count() < MIN_TITLE_CHARS {
        return Err(ValidationError::TitleTooShort);
    }

    let body = input.body.unwrap_or_default();
    if body.trim().chars().count() < MIN_BODY_CHARS {
        return Err(ValidationError::BodyTooShort);
    }

    let category = input
        .tag
        .and_then(Category::from_tag)
        .ok_or(ValidationError::InvalidCategory)?;

    Ok(NewAnnouncement {
        title: title.to_string(),
        body: body.to_string(),
        category,
        attachments,
        created_by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(title: &'a str, body: &'a str, tag: &'a str) -> AnnouncementInput<'a> {
        AnnouncementInput {
            title: Some(title),
            body: Some(body),
            tag: Some(tag),
        }
    }

    #[test]
    fn accepts_valid_input_and_trims_title() {
        let a = validate(
            input("  Midterm ", "Midterms start next week in all halls.", "academic"),
            vec![],
            SubscriberId::new("1"),
        )
        .unwrap();
        assert_eq!(a.title, "Midterm");
        assert_eq!(a.category, Category::Academic);
    }

    #[test]
    fn short_title_is_rejected_with_exact_message() {
        let err = validate(
            input("Hi", "Midterms start next week.", "academic"),
            vec![],
            SubscriberId::new("1"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Title must be at least 3 characters long");
    }

    #[test]
    fn whitespace_padding_does_not_count_towards_length() {
        let err = validate(
            input("  ab  ", "Midterms start next week.", "academic"),
            vec![],
            SubscriberId::new("1"),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::TitleTooShort);

        let err = validate(
            input("Midterm", "   short    ", "academic"),
            vec![],
            SubscriberId::new("1"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Message must be at least 10 characters long");
    }

    #[test]
    fn unknown_or_missing_tag_is_rejected() {
        for tag in [Some("music"), Some("ACADEMIC"), None] {
            let err = validate(
                AnnouncementInput {
                    title: Some("Midterm"),
                    body: Some("Midterms start next week."),
                    tag,
                },
                vec![],
                SubscriberId::new("1"),
            )
            .unwrap_err();
            assert_eq!(err.to_string(), "Invalid tag selected");
        }
    }

    #[test]
    fn title_is_checked_before_body() {
        let err = validate(AnnouncementInput::default(), vec![], SubscriberId::new("1"))
            .unwrap_err();
        assert_eq!(err, ValidationError::TitleTooShort);
    }
}
