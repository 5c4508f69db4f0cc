use crate::types::CharacterKind;

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Adventurer".to_string();
    }
    trimmed.chars().take(16).collect()
}

pub fn parse_character(raw: Option<&str>) -> CharacterKind {
    raw.and_then(CharacterKind::parse)
        .unwrap_or(CharacterKind::Dwarf)
}

pub fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_applies_trim_empty_and_max_len() {
        assert_eq!(sanitize_name(""), "Adventurer");
        assert_eq!(sanitize_name("   "), "Adventurer");
        assert_eq!(sanitize_name(" Alice "), "Alice");
        assert_eq!(sanitize_name("12345678901234567890"), "1234567890123456");
    }

    #[test]
    fn unknown_characters_fall_back_to_dwarf() {
        assert_eq!(parse_character(Some("wizard")), CharacterKind::Wizard);
        assert_eq!(parse_character(Some("paladin")), CharacterKind::Dwarf);
        assert_eq!(parse_character(None), CharacterKind::Dwarf);
    }

    #[test]
    fn leaderboard_limit_parsing_is_lenient_for_invalid_values() {
        assert_eq!(parse_leaderboard_limit(Some("8")), Some(8));
        assert_eq!(parse_leaderboard_limit(Some("0")), Some(0));
        assert_eq!(parse_leaderboard_limit(Some("abc")), None);
        assert_eq!(parse_leaderboard_limit(Some("-1")), None);
        assert_eq!(parse_leaderboard_limit(None), None);
    }
}
