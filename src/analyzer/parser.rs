/// Fields extracted from one analyzer output line.
///
/// Helium and oxygen are always present in a parsed line. The remaining fields are optional
/// and only overwrite the published reading when the line carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub helium: f32,
    pub oxygen: f32,
    pub temperature: Option<f32>,
    pub pressure: Option<f32>,
    pub timestamp: Option<String>,
}

/// Width of the pressure field that precedes the `hPa` unit.
const PRESSURE_FIELD_WIDTH: usize = 8;

/// Parse a trimmed analyzer line such as
/// `He   0.5 %  O2  21.2 %  Ti  24.5 ~C  1004.4 hPa   2025/11/25 18:45:43`.
///
/// Lines that do not start with the helium marker, lack the oxygen marker or report a
/// non-positive oxygen fraction are rejected.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    if !line.starts_with("He") || !line.contains("O2") {
        return None;
    }

    let helium = value_after(line, "He")?;
    let oxygen = value_after(line, "O2").filter(|&oxygen| oxygen > 0.0)?;

    Some(ParsedLine {
        helium,
        oxygen,
        temperature: value_after(line, "Ti"),
        pressure: pressure(line),
        timestamp: timestamp(line),
    })
}

/// Find `prefix`, skip blanks and collect the numeric token behind it.
///
/// Returns `None` if the prefix is missing or no numeric characters follow it.
/// A malformed token (e.g. `1.2.3`) yields 0.0.
fn value_after(line: &str, prefix: &str) -> Option<f32> {
    let start = line.find(prefix)? + prefix.len();
    let rest = line[start..].trim_start_matches([' ', '\t']);

    let token_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(rest.len());

    if token_len == 0 {
        return None;
    }

    Some(rest[..token_len].parse().unwrap_or(0.0))
}

/// The fixed-width field in front of `hPa`.
fn pressure(line: &str) -> Option<f32> {
    let unit = line.find("hPa").filter(|&idx| idx > 0)?;
    let field = line.get(unit.saturating_sub(PRESSURE_FIELD_WIDTH)..unit)?;

    Some(field.trim().parse().unwrap_or(0.0))
}

/// Everything from the first `20` that starts a `YYYY/` year to the end of the line.
///
/// Values such as `O2 20.9` also contain `20`, hence the year shape check.
fn timestamp(line: &str) -> Option<String> {
    let start = line
        .match_indices("20")
        .map(|(idx, _)| idx)
        .find(|&idx| idx > 0 && starts_with_year(&line.as_bytes()[idx..]))?;

    Some(line[start..].trim().to_string())
}

fn starts_with_year(bytes: &[u8]) -> bool {
    bytes.len() > 4 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "He   0.5 %  O2  21.2 %  Ti  24.5 ~C  1004.4 hPa   2025/11/25 18:45:43";

    #[test]
    fn parses_full_line() {
        assert_eq!(
            parse_line(SAMPLE),
            Some(ParsedLine {
                helium: 0.5,
                oxygen: 21.2,
                temperature: Some(24.5),
                pressure: Some(1004.4),
                timestamp: Some(String::from("2025/11/25 18:45:43")),
            })
        );
    }

    #[test]
    fn rejects_lines_without_markers() {
        assert_eq!(parse_line("O2  21.2 %  He 0.5 %"), None);
        assert_eq!(parse_line("He   0.5 %  Ti 24.5"), None);
        assert_eq!(parse_line("Calibrating..."), None);
    }

    #[test]
    fn rejects_non_positive_oxygen() {
        assert_eq!(parse_line("He 0.5 % O2 0.0 %"), None);
        assert_eq!(parse_line("He 0.5 % O2 -3 %"), None);
        assert_eq!(parse_line("He 0.5 % O2 --- %"), None);
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let parsed = parse_line("He 35.0 % O2 18.0 %").unwrap();

        assert_eq!(parsed.helium, 35.0);
        assert_eq!(parsed.oxygen, 18.0);
        assert_eq!(parsed.temperature, None);
        assert_eq!(parsed.pressure, None);
        assert_eq!(parsed.timestamp, None);
    }

    #[test]
    fn malformed_number_becomes_zero() {
        let parsed = parse_line("He 1.2.3 % O2 32.0 %").unwrap();
        assert_eq!(parsed.helium, 0.0);
        assert_eq!(parsed.oxygen, 32.0);
    }

    #[test]
    fn tabs_between_marker_and_value() {
        let parsed = parse_line("He\t\t10.0 % O2\t 30.5 %").unwrap();
        assert_eq!(parsed.helium, 10.0);
        assert_eq!(parsed.oxygen, 30.5);
    }

    #[test]
    fn oxygen_near_twenty_is_not_a_timestamp() {
        let parsed =
            parse_line("He   0.0 %  O2  20.9 %  Ti  22.0 ~C  1013.2 hPa   2026/01/02 08:00:00")
                .unwrap();

        assert_eq!(parsed.oxygen, 20.9);
        assert_eq!(parsed.timestamp.as_deref(), Some("2026/01/02 08:00:00"));

        let parsed = parse_line("He 0.7 % O2 20.8 %").unwrap();
        assert_eq!(parsed.timestamp, None);
    }
}
