//! Formatting utilities for Telegram HTML replies.

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Masked indicator for the one-time-code buffer: one placeholder per
/// entered digit, `...` while empty. The code itself is never echoed back
/// into the chat.
pub fn otp_display(buffer: &str) -> String {
    if buffer.is_empty() {
        return "...".to_string();
    }
    let mut out = String::with_capacity(buffer.len() * 2);
    for i in 0..buffer.chars().count() {
        if i > 0 {
            out.push(' ');
        }
        out.push('_');
    }
    out
}

/// Shorten error copy before it reaches the chat.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    format!("{}...", text.chars().take(max_chars).collect::<String>())
}

/// Loose plausibility check for an international phone number. The platform
/// has the final say; this only rejects obvious non-numbers locally.
pub fn is_plausible_phone(text: &str) -> bool {
    let re = regex::Regex::new(r"^\+?[0-9][0-9 ().-]{5,18}$").expect("valid regex");
    re.is_match(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn otp_indicator() {
        assert_eq!(otp_display(""), "...");
        assert_eq!(otp_display("1"), "_");
        assert_eq!(otp_display("123"), "_ _ _");
    }

    #[test]
    fn truncates_long_text_only() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 10), "0123456789...");
    }

    #[test]
    fn phone_plausibility() {
        assert!(is_plausible_phone("+15550001111"));
        assert!(is_plausible_phone("+44 20 7946 0958"));
        assert!(is_plausible_phone("919876543210"));
        assert!(!is_plausible_phone("hello"));
        assert!(!is_plausible_phone("+1"));
        assert!(!is_plausible_phone(""));
    }
}
