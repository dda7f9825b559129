/// Known upstream messages and their English rendering
const TRANSLATIONS: &[(&str, &str)] = &[(
    "当前ip并发查询限制为1次,每秒钟查询限制为1次,每分钟查询限制为10次,限制条件触发",
    "Rate limit triggered: 1 concurrent, 1 per second, 10 per minute.",
)];

/// Translate an upstream message; unknown messages pass through unchanged
pub fn translate_message(message: &str) -> String {
    TRANSLATIONS
        .iter()
        .find(|(source, _)| *source == message)
        .map_or_else(|| message.to_string(), |(_, english)| english.to_string())
}
