//! Input checks shared by the auth and flashcard routes.

pub const MAX_CARD_TEXT_CHARS: usize = 4000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_SUBJECT_ID_CHARS: usize = 64;

/// At least 8 and at most 256 bytes, with an upper case letter, a lower case
/// letter and a digit.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if password.len() > 256 {
        return Err("Password must be at most 256 characters");
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_upper || !has_lower || !has_digit {
        return Err("Password needs an upper case letter, a lower case letter and a digit");
    }
    Ok(())
}

/// Plain `local@domain.tld` check, no quoted local parts.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if !local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'+' || b == b'-')
    {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    {
        return false;
    }
    domain
        .split('.')
        .all(|part| !part.is_empty() && !part.starts_with('-') && !part.ends_with('-'))
}

/// 2 to 50 characters of letters, digits, spaces, `_` or `-`.
pub fn validate_display_name(name: &str) -> Result<(), &'static str> {
    let char_count = name.chars().count();
    if !(2..=50).contains(&char_count) {
        return Err("Display name must be between 2 and 50 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ')
    {
        return Err("Display name may only contain letters, digits, spaces, '_' and '-'");
    }
    Ok(())
}

/// Front or back of a card: non-blank, bounded length.
pub fn validate_card_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value.chars().count() > MAX_CARD_TEXT_CHARS {
        return Err(format!(
            "{field} must be at most {MAX_CARD_TEXT_CHARS} characters"
        ));
    }
    Ok(())
}

pub fn validate_tags(tags: &[String]) -> Result<(), String> {
    if tags.len() > MAX_TAGS {
        return Err(format!("At most {MAX_TAGS} tags are allowed"));
    }
    for tag in tags {
        if tag.trim().is_empty() {
            return Err("Tags must not be empty".to_string());
        }
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(format!("Tags must be at most {MAX_TAG_CHARS} characters"));
        }
    }
    Ok(())
}

pub fn validate_subject_id(subject_id: &str) -> Result<(), String> {
    let count = subject_id.chars().count();
    if subject_id.trim().is_empty() || count > MAX_SUBJECT_ID_CHARS {
        return Err(format!(
            "subjectId must be between 1 and {MAX_SUBJECT_ID_CHARS} characters"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_password_accepted() {
        assert!(validate_password("Abc12345").is_ok());
    }

    #[test]
    fn weak_passwords_rejected() {
        assert!(validate_password("Ab1").is_err());
        assert!(validate_password("abcdefg1").is_err());
        assert!(validate_password("Abcdefgh").is_err());
    }

    #[test]
    fn valid_emails_accepted() {
        assert!(is_valid_email("aluno@ufam.edu.br"));
        assert!(is_valid_email("first.last@example.com"));
        assert!(is_valid_email("user+tag@my-domain.com"));
    }

    #[test]
    fn malformed_emails_rejected() {
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@exam_ple.com"));
        assert!(!is_valid_email("user@-example.com"));
        assert!(!is_valid_email("us er@example.com"));
        assert!(!is_valid_email(".user@example.com"));
        assert!(!is_valid_email("user..name@example.com"));
    }

    #[test]
    fn display_name_rules() {
        assert!(validate_display_name("Ana Souza").is_ok());
        assert!(validate_display_name("João").is_ok());
        assert!(validate_display_name("a").is_err());
        assert!(validate_display_name("user@name").is_err());
        assert!(validate_display_name(&"é".repeat(51)).is_err());
    }

    #[test]
    fn card_text_rules() {
        assert!(validate_card_text("front", "What is a derivative?").is_ok());
        assert!(validate_card_text("front", "   ").is_err());
        assert!(validate_card_text("back", &"x".repeat(MAX_CARD_TEXT_CHARS)).is_ok());
        assert!(validate_card_text("back", &"x".repeat(MAX_CARD_TEXT_CHARS + 1)).is_err());
    }

    #[test]
    fn tag_rules() {
        assert!(validate_tags(&["calculus".to_string()]).is_ok());
        assert!(validate_tags(&[" ".to_string()]).is_err());
        assert!(validate_tags(&["t".repeat(MAX_TAG_CHARS + 1)]).is_err());
        let many: Vec<String> = (0..=MAX_TAGS).map(|i| format!("tag{i}")).collect();
        assert!(validate_tags(&many).is_err());
    }

    #[test]
    fn subject_id_rules() {
        assert!(validate_subject_id("math-101").is_ok());
        assert!(validate_subject_id("").is_err());
    }
}
