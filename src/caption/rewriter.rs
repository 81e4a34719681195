//! The trigger-word rewrite rule applied to a single caption.

/// Trigger word used when no override is supplied.
pub const DEFAULT_TRIGGER_WORD: &str = "mikaylahau";

/// Rewrites one caption so it references the trigger word.
///
/// The caption is trimmed, every literal occurrence of `"woman"` and `"man"`
/// is replaced with `trigger_word` (case-sensitive substring match, so the
/// token is also matched inside longer words), and the trigger word is
/// prepended when the result does not already contain it.
///
/// This is a pure function and deterministic over its inputs. It is only
/// idempotent when `trigger_word` itself contains neither `"woman"` nor
/// `"man"` as a substring; callers must not pick a trigger word violating
/// that, otherwise repeated runs keep re-substituting.
pub fn rewrite(caption: &str, trigger_word: &str) -> String {
    let mut line = caption.trim().to_string();

    // "woman" first, so "man" does not eat its tail.
    line = line.replace("woman", trigger_word);
    line = line.replace("man", trigger_word);

    if !line.contains(trigger_word) {
        line = format!("{trigger_word} {line}");
    }

    line
}
