// Topic filter helpers

const SHARED_SUBSCRIPTION: &str = "$share/";

/// Prepends the configured subscription prefix to a logical topic filter.
pub fn prefixed_filter(prefix: &str, filter: &str) -> String {
    format!("{}{}", prefix, filter)
}

/// Returns the part of a subscription filter that incoming topics are matched
/// against. Brokers deliver shared subscriptions (`$share/<group>/<filter>`)
/// under the plain topic, so the share segment is removed.
pub fn matching_filter(filter: &str) -> &str {
    match filter.strip_prefix(SHARED_SUBSCRIPTION) {
        Some(rest) => rest.split_once('/').map(|(_, filter)| filter).unwrap_or(rest),
        None => filter,
    }
}

/// MQTT topic filter matching with `+` (one level) and `#` (remaining levels).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    // Wildcards at the first level never match topics beginning with '$'
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
