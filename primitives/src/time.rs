use chrono::{DateTime, NaiveDateTime, Utc};

/// Filename-safe timestamp format, e.g. `2019_09_08__12_00_00`, matching the
/// original's submission directory naming (`student_a.2019_09_08__12_00`).
pub const DATETIME_FILE_FORMAT: &str = "%Y_%m_%d__%H_%M_%S";

/// Human-readable timestamp used in traces and the published snapshot.
pub const DATETIME_TRACE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_trace(time: &DateTime<Utc>) -> String {
	time.format(DATETIME_TRACE_FORMAT).to_string()
}

pub fn parse_trace(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
	let naive = NaiveDateTime::parse_from_str(s, DATETIME_TRACE_FORMAT)?;
	Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn trace_format_round_trips() {
		let time = Utc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap();
		let formatted = format_trace(&time);
		let parsed = parse_trace(&formatted).unwrap();
		assert_eq!(parsed, time);
	}
}
