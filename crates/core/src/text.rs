pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Appends `fragment` followed by a newline, ignoring blank fragments.
pub fn push_line(target: &mut String, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    target.push_str(fragment);
    target.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof \u{a0} spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn blank_fragments_are_not_appended() {
        let mut text = String::new();
        push_line(&mut text, "  first page ");
        push_line(&mut text, "   \n ");
        push_line(&mut text, "second");
        assert_eq!(text, "first page\nsecond\n");
    }
}
