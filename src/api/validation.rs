use super::ApiError;
use crate::constants::limits;

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }

    if trimmed.len() > limits::MAX_USERNAME_LEN {
        return Err(ApiError::validation(format!(
            "Username must be {} characters or less",
            limits::MAX_USERNAME_LEN
        )));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, underscores, hyphens, and dots",
        ));
    }

    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if password.len() < limits::MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            limits::MIN_PASSWORD_LEN
        )));
    }
    Ok(password)
}

/// Shape check only: one '@', non-empty local part, domain with a dot,
/// no whitespace anywhere.
pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();

    let valid = !trimmed.contains(char::is_whitespace)
        && match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && domain.split('.').count() >= 2
                    && domain.split('.').all(|part| !part.is_empty())
            }
            None => false,
        };

    if !valid {
        return Err(ApiError::validation("Invalid email address"));
    }

    Ok(trimmed)
}

pub fn validate_amount(amount: i64) -> Result<i64, ApiError> {
    if amount <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid amount: {}. Amount must be a positive integer",
            amount
        )));
    }
    Ok(amount)
}

pub fn validate_id(id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid ID: {}. ID must be a positive integer",
            id
        )));
    }
    Ok(id)
}

pub fn validate_note(note: &str) -> Result<&str, ApiError> {
    if note.len() > limits::MAX_NOTE_LEN {
        return Err(ApiError::validation(format!(
            "Note must be {} characters or less",
            limits::MAX_NOTE_LEN
        )));
    }
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("a.b-c").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b@mail.co.uk").is_ok());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@example").is_err());
        assert!(validate_email("alice@exa mple.com").is_err());
        assert!(validate_email("alice@example..com").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(50_000).is_ok());
        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-100).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id(1).is_ok());
        assert!(validate_id(0).is_err());
        assert!(validate_id(-1).is_err());
    }
}
