//! Error classification and self-reference detection.
//!
//! Classification order:
//! 1. Explicit caller hint
//! 2. Keyword scan of the message (first matching rule wins)
//! 3. [`ErrorType::Runtime`]
//!
//! Lowercase keywords match case-insensitively. The `API` and `HTTP` acronyms
//! match case-sensitively so URLs (`https://...`) and words such as "rapid"
//! do not turn every message into an API error.

use super::types::ErrorType;

/// Identifiers of the telemetry subsystem itself. Anything mentioning one of
/// these is dropped so a failure inside the collector can never report itself.
pub const SELF_IDENTIFIERS: &[&str] = &[
    "ErrorTracker",
    "error-tracker",
    "lantern_telemetry",
    "lantern-telemetry",
];

struct KeywordRule {
    error_type: ErrorType,
    insensitive: &'static [&'static str],
    sensitive: &'static [&'static str],
}

const RULES: &[KeywordRule] = &[
    KeywordRule {
        error_type: ErrorType::Network,
        insensitive: &["fetch", "network"],
        sensitive: &[],
    },
    KeywordRule {
        error_type: ErrorType::Api,
        insensitive: &[],
        sensitive: &["API", "HTTP"],
    },
    KeywordRule {
        error_type: ErrorType::Validation,
        insensitive: &["validation", "invalid"],
        sensitive: &[],
    },
    KeywordRule {
        error_type: ErrorType::Security,
        insensitive: &["unauthorized", "forbidden"],
        sensitive: &[],
    },
];

/// Determine the type of an error from its message and an optional hint.
#[must_use]
pub fn classify(message: &str, hint: Option<ErrorType>) -> ErrorType {
    if let Some(error_type) = hint {
        return error_type;
    }

    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|rule| {
            rule.insensitive.iter().any(|k| lowered.contains(k))
                || rule.sensitive.iter().any(|k| message.contains(k))
        })
        .map_or(ErrorType::Runtime, |rule| rule.error_type)
}

/// Whether `text` references the telemetry subsystem's own identifiers.
#[must_use]
pub fn references_telemetry(text: &str) -> bool {
    SELF_IDENTIFIERS.iter().any(|id| text.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_wins_over_keywords() {
        assert_eq!(
            classify("network unreachable", Some(ErrorType::Security)),
            ErrorType::Security
        );
    }

    #[test]
    fn keyword_rules() {
        assert_eq!(classify("Failed to fetch", None), ErrorType::Network);
        assert_eq!(classify("Network timeout", None), ErrorType::Network);
        assert_eq!(classify("API quota exceeded", None), ErrorType::Api);
        assert_eq!(classify("HTTP 502: /orders", None), ErrorType::Api);
        assert_eq!(classify("Validation failed for sku", None), ErrorType::Validation);
        assert_eq!(classify("invalid postcode", None), ErrorType::Validation);
        assert_eq!(classify("Unauthorized", None), ErrorType::Security);
        assert_eq!(classify("403 Forbidden", None), ErrorType::Security);
    }

    #[test]
    fn earlier_rule_wins() {
        assert_eq!(classify("network error calling API", None), ErrorType::Network);
        assert_eq!(classify("API returned invalid payload", None), ErrorType::Api);
    }

    #[test]
    fn acronyms_are_case_sensitive() {
        assert_eq!(classify("rapid checkout failed", None), ErrorType::Runtime);
        assert_eq!(
            classify("bad redirect to https://shop.example.com", None),
            ErrorType::Runtime
        );
    }

    #[test]
    fn defaults_to_runtime() {
        assert_eq!(classify("Boom", None), ErrorType::Runtime);
    }

    #[test]
    fn self_reference_detection() {
        assert!(references_telemetry("ErrorTracker failed to flush"));
        assert!(references_telemetry(
            "panicked at crates/lantern-telemetry/src/collector.rs:10:5"
        ));
        assert!(!references_telemetry("Cart total mismatch"));
    }
}
