/// Parse a boolean-like flag.
/// Accepts 1/0, true/false, yes/no, on/off (case-insensitive).
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read an environment variable and parse it with [`parse_bool_flag`].
pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_bool_flag(&raw))
}

/// The `"true"`-only string flags used by request parameters such as
/// `logscale`; anything else is false.
pub fn is_true_literal(raw: Option<&str>) -> bool {
    raw == Some("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env;

    #[test]
    fn parse_bool_flag_recognizes_common_values() {
        assert_eq!(parse_bool_flag("true"), Some(true));
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn env_bool_reads_env() {
        let mut guard = env::guard();
        guard.set("CELLX_TEST_BOOL", "on");
        assert_eq!(env_bool("CELLX_TEST_BOOL"), Some(true));
        guard.remove("CELLX_TEST_BOOL");
        assert_eq!(env_bool("CELLX_TEST_BOOL"), None);
    }

    #[test]
    fn only_the_true_literal_enables_request_flags() {
        assert!(is_true_literal(Some("true")));
        assert!(!is_true_literal(Some("True")));
        assert!(!is_true_literal(None));
    }
}
