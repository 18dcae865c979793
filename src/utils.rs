/// Best-effort integer parse for form input. Unparsable input becomes `min`;
/// numbers outside `min..=max` are clamped.
pub fn coerce_int(input: &str, min: i64, max: i64) -> i64 {
    let trimmed = input.trim();
    let parsed = trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64));

    match parsed {
        Some(value) if value < min => min,
        Some(value) if value > max => max,
        Some(value) => value,
        None => min,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int("42", 1, 120), 42);
        assert_eq!(coerce_int("  7 ", 1, 10), 7);
        assert_eq!(coerce_int("3.9", 0, 4), 3);
        assert_eq!(coerce_int("abc", 1, 120), 1);
        assert_eq!(coerce_int("", 0, 4), 0);
        assert_eq!(coerce_int("-5", 1, 10), 1);
        assert_eq!(coerce_int("999", 1, 120), 120);
        assert_eq!(coerce_int("NaN", 1, 10), 1);
    }
}
