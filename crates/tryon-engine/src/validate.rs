use crate::error::{StudioError, StudioResult};

/// Returns the trimmed value of a required image field.
pub fn require_image<'a>(field: &str, value: Option<&'a str>) -> StudioResult<&'a str> {
    require(field, value, "image")
}

pub fn require_text<'a>(field: &str, value: Option<&'a str>) -> StudioResult<&'a str> {
    require(field, value, "text")
}

fn require<'a>(field: &str, value: Option<&'a str>, what: &str) -> StudioResult<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| StudioError::validation(format!("{field} is required ({what})")))
}

/// Blank optional text collapses to `None`.
pub fn optional_text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{optional_text, require_image, require_text};
    use crate::error::ErrorKind;

    #[test]
    fn blank_and_missing_fields_are_validation_errors() {
        for value in [None, Some(""), Some("   ")] {
            let err = require_image("modelImage", value).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert!(err.to_string().contains("modelImage is required"));
        }
        assert_eq!(require_text("prompt", Some(" hat ")).unwrap(), "hat");
        assert_eq!(optional_text(Some("  ")), None);
    }
}
