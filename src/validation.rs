//! Input checks for lead payloads.
//!
//! Every failure is reported as [`AppError::BadRequest`] so it reaches the
//! caller as a 400, never as a server error.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::AppError;
use crate::models::{LeadPayload, NewLead};

const MAX_NAME_LEN: usize = 200;
const MAX_TEXT_LEN: usize = 5_000;
const MAX_TECHNOLOGIES: usize = 10;

// RFC 5322 simplified email regex
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email regex is valid")
});

/// Checks and normalizes a create/replace payload.
pub fn validate_lead(payload: LeadPayload) -> Result<NewLead, AppError> {
    let name = clean(payload.name)
        .ok_or_else(|| AppError::BadRequest("name is required".to_string()))?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }

    let website = clean(payload.website)
        .map(|w| normalize_website(&w))
        .transpose()?;

    let contact_email = clean(payload.contact_email)
        .map(|email| {
            if is_valid_email(&email) {
                Ok(email.to_lowercase())
            } else {
                Err(AppError::BadRequest(format!(
                    "contact_email '{}' is not a valid email address",
                    email
                )))
            }
        })
        .transpose()?;

    let contact_phone = clean(payload.contact_phone)
        .map(|phone| {
            if is_valid_phone(&phone) {
                Ok(phone)
            } else {
                Err(AppError::BadRequest(format!(
                    "contact_phone '{}' is not a valid phone number",
                    phone
                )))
            }
        })
        .transpose()?;

    let description = clean(payload.description);
    if description
        .as_deref()
        .is_some_and(|d| d.chars().count() > MAX_TEXT_LEN)
    {
        return Err(AppError::BadRequest(format!(
            "description must be at most {} characters",
            MAX_TEXT_LEN
        )));
    }

    Ok(NewLead {
        name,
        website,
        industry: clean(payload.industry),
        company_size: clean(payload.company_size),
        description,
        technologies: clean_list(payload.technologies),
        contact_email,
        contact_phone,
        contact_address: clean(payload.contact_address),
    })
}

/// Trimmed value, or `None` when absent or blank.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| clean(Some(item)))
        .take(MAX_TECHNOLOGIES)
        .collect()
}

/// Adds `https://` to schemeless input and requires an http(s) URL with a host.
pub fn normalize_website(raw: &str) -> Result<String, AppError> {
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let invalid = || AppError::BadRequest(format!("website '{}' is not a valid URL", raw));
    let parsed = url::Url::parse(&candidate).map_err(|_| invalid())?;
    match parsed.host_str() {
        Some(host) if host.contains('.') || host == "localhost" => Ok(candidate),
        _ => Err(invalid()),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 254 {
        return false;
    }
    if !EMAIL_RE.is_match(email) {
        tracing::debug!("Invalid email format: {}", email);
        return false;
    }
    true
}

/// Accepts common formatting characters and 7 to 15 digits (E.164 range).
pub fn is_valid_phone(phone: &str) -> bool {
    let allowed = |c: char| c.is_ascii_digit() || " +-().".contains(c);
    if !phone.chars().all(allowed) {
        return false;
    }
    if phone.rfind('+').is_some_and(|idx| idx != 0) {
        return false;
    }
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: &str) -> LeadPayload {
        LeadPayload {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn name_is_required() {
        assert!(matches!(
            validate_lead(LeadPayload::default()),
            Err(AppError::BadRequest(_))
        ));
        assert!(validate_lead(payload("   ")).is_err());
        assert!(validate_lead(payload(&"x".repeat(201))).is_err());
    }

    #[test]
    fn fields_are_trimmed_and_blanks_dropped() {
        let lead = validate_lead(LeadPayload {
            name: Some("  Acme  ".into()),
            industry: Some("   ".into()),
            technologies: vec![" Rust ".into(), "".into(), "Postgres".into()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(lead.name, "Acme");
        assert_eq!(lead.industry, None);
        assert_eq!(lead.technologies, vec!["Rust", "Postgres"]);
    }

    #[test]
    fn technologies_capped() {
        let lead = validate_lead(LeadPayload {
            name: Some("Acme".into()),
            technologies: (0..25).map(|i| format!("tech-{i}")).collect(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(lead.technologies.len(), MAX_TECHNOLOGIES);
    }

    #[test]
    fn website_normalized() {
        assert_eq!(normalize_website("acme.com").unwrap(), "https://acme.com");
        assert_eq!(
            normalize_website("http://acme.com/about").unwrap(),
            "http://acme.com/about"
        );
        assert!(normalize_website("not a url").is_err());
        assert!(normalize_website("https://").is_err());
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("test.user+tag@subdomain.example.co.uk"));
        assert!(!is_valid_email("not_an_email"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("+1 (415) 555-0100"));
        assert!(is_valid_phone("11987654321"));
        assert!(!is_valid_phone("123"));
        assert!(!is_valid_phone("555-CALL-NOW"));
        assert!(!is_valid_phone("12+3456789"));
    }
}
