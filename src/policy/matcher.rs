//! Command rule matching.
//!
//! A rule is either a case-insensitive substring or, when wrapped in
//! slashes (`/^show\s+ip/`), a case-insensitive regular expression.
//! A rule that fails to compile, or has an empty pattern (`//`), never
//! matches.

use regex::RegexBuilder;

/// Whether `command` matches a single rule
pub fn rule_matches(command: &str, rule: &str) -> bool {
    if rule.is_empty() {
        return false;
    }

    if rule.len() >= 2 && rule.starts_with('/') && rule.ends_with('/') {
        let pattern = &rule[1..rule.len() - 1];
        if pattern.is_empty() {
            return false;
        }
        return RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(command))
            .unwrap_or(false);
    }

    command.to_lowercase().contains(&rule.to_lowercase())
}

/// First rule in `rules` that matches `command`
pub fn first_match<'a>(command: &str, rules: &'a [String]) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| rule_matches(command, rule))
        .map(String::as_str)
}

/// First command in `commands` that matches any rule in `rules`
pub fn find_blocked<'a>(commands: &'a [String], rules: &[String]) -> Option<&'a str> {
    commands
        .iter()
        .find(|command| first_match(command, rules).is_some())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_is_case_insensitive() {
        assert!(rule_matches("SHOW Interface Gi0/1", "show interface"));
        assert!(rule_matches("show ip route", "IP ROUTE"));
        assert!(!rule_matches("show version", "show interface"));
    }

    #[test]
    fn test_empty_rule_never_matches() {
        assert!(!rule_matches("anything", ""));
    }

    #[test]
    fn test_regex_rules() {
        assert!(rule_matches("show ip route 10.0.0.0", r"/^show\s+ip\s+route/"));
        assert!(rule_matches("SHOW IP ROUTE", r"/^show\s+ip\s+route/"));
        assert!(!rule_matches("no show ip route", r"/^show\s+ip\s+route/"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        assert!(!rule_matches("show (", "/show (/"));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!rule_matches("show version", "//"));
        assert!(!rule_matches("", "//"));
        assert_eq!(first_match("write erase", &["//".to_string()]), None);
        let commands = vec!["reload".to_string()];
        assert_eq!(find_blocked(&commands, &["//".to_string()]), None);
    }

    #[test]
    fn test_lone_slash_is_substring() {
        assert!(rule_matches("/interface print", "/"));
    }

    #[test]
    fn test_find_blocked() {
        let commands = vec!["show version".to_string(), "write erase".to_string()];
        let rules = vec!["reload".to_string(), "ERASE".to_string()];
        assert_eq!(find_blocked(&commands, &rules), Some("write erase"));
        assert_eq!(find_blocked(&commands[..1], &rules), None);
    }
}
