//! Placeholder tags and their substitution.
//!
//! Text blocks may contain tags such as `{{NOME}}`. Resolution walks the
//! text once, left to right; a substituted value is copied to the output and
//! never scanned again, so tag-like participant input stays literal.

use chrono::NaiveDate;

use rollcall_core::{ParticipantId, VerificationHash};

/// The fixed set of substitutable tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Name,
    Event,
    Hours,
    Date,
    ParticipantId,
    Hash,
}

impl Tag {
    pub const ALL: [Tag; 6] = [
        Tag::Name,
        Tag::Event,
        Tag::Hours,
        Tag::Date,
        Tag::ParticipantId,
        Tag::Hash,
    ];

    /// The literal spelling inside a template.
    pub const fn literal(self) -> &'static str {
        match self {
            Tag::Name => "{{NOME}}",
            Tag::Event => "{{EVENTO}}",
            Tag::Hours => "{{HORAS}}",
            Tag::Date => "{{DATA}}",
            Tag::ParticipantId => "{{CPF}}",
            Tag::Hash => "{{HASH}}",
        }
    }

    fn match_at(text: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|t| text.starts_with(t.literal()))
    }
}

/// Values bound to each tag for one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    pub name: String,
    pub event: String,
    pub hours: u32,
    /// Event start date as `YYYY-MM-DD`.
    pub date: Option<String>,
    pub participant_id: ParticipantId,
    pub hash: VerificationHash,
}

impl Bindings {
    /// The rendered value of a tag.
    pub fn value(&self, tag: Tag) -> String {
        match tag {
            Tag::Name => self.name.to_uppercase(),
            Tag::Event => self.event.clone(),
            Tag::Hours => self.hours.to_string(),
            Tag::Date => self.date.as_deref().map(format_date).unwrap_or_default(),
            Tag::ParticipantId => self.participant_id.to_string(),
            Tag::Hash => self.hash.to_string(),
        }
    }
}

/// Format an ISO date as `DD/MM/YYYY`. Unparseable input passes through.
pub fn format_date(iso: &str) -> String {
    match NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
        Ok(date) => date.format("%d/%m/%Y").to_string(),
        Err(_) => iso.to_string(),
    }
}

/// Replace every known tag in `text`. Unknown `{{...}}` sequences are kept.
pub fn resolve(text: &str, bindings: &Bindings) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("{{") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match Tag::match_at(rest) {
            Some(tag) => {
                out.push_str(&bindings.value(tag));
                rest = &rest[tag.literal().len()..];
            }
            None => {
                out.push_str("{{");
                rest = &rest[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        Bindings {
            name: "Maria Silva".into(),
            event: "Semana de Tecnologia".into(),
            hours: 12,
            date: Some("2026-03-09".into()),
            participant_id: ParticipantId::new("12345678900"),
            hash: VerificationHash::parse("0123456789ABCDEF").unwrap(),
        }
    }

    #[test]
    fn test_all_tags_resolve() {
        let text = "{{NOME}}|{{EVENTO}}|{{HORAS}}|{{DATA}}|{{CPF}}|{{HASH}}";
        assert_eq!(
            resolve(text, &bindings()),
            "MARIA SILVA|Semana de Tecnologia|12|09/03/2026|12345678900|0123456789ABCDEF"
        );
    }

    #[test]
    fn test_unknown_tags_stay_verbatim() {
        assert_eq!(
            resolve("Hi {{FOO}} and {{NOME", &bindings()),
            "Hi {{FOO}} and {{NOME"
        );
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let mut b = bindings();
        b.event = "{{NOME}}".into();
        assert_eq!(resolve("{{EVENTO}}", &b), "{{NOME}}");
    }

    #[test]
    fn test_missing_date_is_empty() {
        let mut b = bindings();
        b.date = None;
        assert_eq!(resolve("on {{DATA}}.", &b), "on .");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2026-12-01"), "01/12/2026");
        assert_eq!(format_date("soon"), "soon");
    }

    #[test]
    fn test_multibyte_text_around_tags() {
        assert_eq!(
            resolve("Certificação · {{HORAS}}h ✓", &bindings()),
            "Certificação · 12h ✓"
        );
    }
}
