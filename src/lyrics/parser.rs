//! LRC format parser
//!
//! Parses synchronized lyrics in LRC format:
//! [mm:ss.xx] Lyrics line here
//!
//! Example:
//! [00:12.34] Hello world
//! [00:15.00] Another line
//!
//! Lines come back in input order. Callers that need monotonic time must sort.

/// A single line of lyrics with timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct LyricLine {
    /// Seconds from the start of the track
    pub time: f64,
    /// The lyrics text
    pub text: String,
}

impl LyricLine {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

/// Parse LRC formatted lyrics.
///
/// A line is kept only when it starts with a `[m:ss]` or `[m:ss.f]` tag
/// (1-3 fraction digits) and has non-empty text after it. When a line carries
/// several tags the first one wins and the rest is kept as caption text.
pub fn parse(content: &str) -> Vec<LyricLine> {
    content.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<LyricLine> {
    let line = line.trim();
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    let time = parse_timestamp(&rest[..end])?;

    let text = rest[end + 1..].trim();
    if text.is_empty() {
        return None;
    }
    Some(LyricLine::new(time, text))
}

/// Parse timestamp string like "00:12.34" to seconds
fn parse_timestamp(s: &str) -> Option<f64> {
    let (min, rest) = s.split_once(':')?;
    let (sec, frac) = match rest.split_once('.') {
        Some((sec, frac)) => (sec, Some(frac)),
        None => (rest, None),
    };

    if min.is_empty() || !min.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if sec.len() != 2 || !sec.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let min: u64 = min.parse().ok()?;
    let sec: u64 = sec.parse().ok()?;
    let mut time = min.checked_mul(60)?.checked_add(sec)? as f64;

    if let Some(frac) = frac {
        if frac.is_empty() || frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // "5", "50" and "500" all mean half a second.
        let digits: f64 = frac.parse().ok()?;
        time += digits / 10f64.powi(frac.len() as i32);
    }

    Some(time)
}

/// Index of the line that should be highlighted at `position` seconds.
///
/// Picks the line with the greatest timestamp not after `position`; on equal
/// timestamps the later line wins. Works on unsorted input.
pub fn current_line_index(lines: &[LyricLine], position: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, line) in lines.iter().enumerate() {
        if line.time > position {
            continue;
        }
        match best {
            Some((_, t)) if line.time < t => {}
            _ => best = Some((i, line.time)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:12"), Some(12.0));
        assert_eq!(parse_timestamp("01:30"), Some(90.0));
        assert!(approx(parse_timestamp("00:12.34").unwrap(), 12.34));
        assert!(approx(parse_timestamp("00:12.340").unwrap(), 12.34));
        assert!(approx(parse_timestamp("1:02.5").unwrap(), 62.5));
        assert!(approx(parse_timestamp("123:00.001").unwrap(), 7380.001));
        assert_eq!(parse_timestamp("00:12.3456"), None);
        assert_eq!(parse_timestamp("00:1"), None);
        assert_eq!(parse_timestamp("ti:Title"), None);
        assert_eq!(parse_timestamp("00:12."), None);
    }

    #[test]
    fn test_parse_lrc() {
        let lrc = r#"
[ti:Test Song]
[ar:Test Artist]
[00:12.34]First line
[00:15.00]  Second line
"#;
        let lines = parse(lrc);
        assert_eq!(lines.len(), 2);
        assert!(approx(lines[0].time, 12.34));
        assert_eq!(lines[0].text, "First line");
        assert_eq!(lines[1].text, "Second line");
    }

    #[test]
    fn drops_untagged_and_empty_lines() {
        let lrc = "plain text\n[00:01.00]\n[00:02.00]   \n[xx:02.00]bad\n[00:03]ok";
        let lines = parse(lrc);
        assert_eq!(lines, vec![LyricLine::new(3.0, "ok")]);
    }

    #[test]
    fn keeps_input_order() {
        let lines = parse("[00:20.00]later\n[00:05.00]earlier");
        assert_eq!(lines[0].text, "later");
        assert_eq!(lines[1].text, "earlier");
    }

    #[test]
    fn first_tag_wins_on_repeated_tags() {
        let lines = parse("[00:01.00][00:09.00] chorus");
        assert_eq!(lines.len(), 1);
        assert!(approx(lines[0].time, 1.0));
        assert_eq!(lines[0].text, "[00:09.00] chorus");
    }

    #[test]
    fn oversized_minutes_are_rejected() {
        assert_eq!(parse_timestamp("307445734561825862:00"), None);
        assert_eq!(parse_timestamp("99999999999999999999:00"), None);
        let lines = parse("[307445734561825862:00]boom\n[00:01]ok");
        assert_eq!(lines, vec![LyricLine::new(1.0, "ok")]);
    }

    #[test]
    fn empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
    }

    #[test]
    fn current_line_on_unsorted_lines() {
        let lines = parse("[00:10.00]b\n[00:01.00]a\n[00:20.00]c");
        assert_eq!(current_line_index(&lines, 0.5), None);
        assert_eq!(current_line_index(&lines, 1.0), Some(1));
        assert_eq!(current_line_index(&lines, 12.0), Some(0));
        assert_eq!(current_line_index(&lines, 99.0), Some(2));
        assert_eq!(current_line_index(&[], 5.0), None);
    }
}
