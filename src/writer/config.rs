use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name written into generator comments unless configured otherwise.
pub const LIBRARY_NAME: &'static str = "lx_xml";

/// Version written into generator comments unless configured otherwise.
pub const LIBRARY_VERSION: &'static str = env!("CARGO_PKG_VERSION");

static DEFAULTS: OnceLock<WriterConfig> = OnceLock::new();

/**
# Generator comment configuration

Controls the comment an [`OutputStream`](super::OutputStream) writes after
the XML declaration. Each stream takes its own copy at construction; there
is no hidden coupling between streams.

Process-wide defaults can be installed exactly once, typically at startup,
via [`WriterConfig::install_defaults`]. [`WriterConfig::default`] returns
those, or the built-in defaults if none were installed.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
	/// Whether the generator comment is written at all.
	pub write_comment: bool,
	/// Whether the comment carries the time of writing.
	pub write_timestamp: bool,
	/// Library name mentioned in the comment. Empty omits the library part.
	pub library_name: String,
	/// Library version mentioned in the comment. Empty omits it.
	pub library_version: String,
}

impl WriterConfig {
	/// The configuration used when nothing was installed.
	pub fn builtin() -> Self {
		Self {
			write_comment: true,
			write_timestamp: true,
			library_name: LIBRARY_NAME.to_string(),
			library_version: LIBRARY_VERSION.to_string(),
		}
	}

	/// Install process-wide defaults.
	///
	/// Only the first call succeeds; later calls hand the rejected
	/// configuration back.
	pub fn install_defaults(cfg: WriterConfig) -> Result<(), WriterConfig> {
		DEFAULTS.set(cfg)?;
		tracing::debug!("installed writer defaults");
		Ok(())
	}

	/// Builder-style switch for [`WriterConfig::write_comment`].
	pub fn with_comment(mut self, write_comment: bool) -> Self {
		self.write_comment = write_comment;
		self
	}

	/// Builder-style switch for [`WriterConfig::write_timestamp`].
	pub fn with_timestamp(mut self, write_timestamp: bool) -> Self {
		self.write_timestamp = write_timestamp;
		self
	}
}

impl Default for WriterConfig {
	fn default() -> Self {
		match DEFAULTS.get() {
			Some(cfg) => cfg.clone(),
			None => Self::builtin(),
		}
	}
}

// days since 1970-01-01 to (year, month, day) in the proleptic gregorian
// calendar
fn civil_from_days(days: i64) -> (i64, u32, u32) {
	let z = days + 719468;
	let era = z.div_euclid(146097);
	let doe = z.rem_euclid(146097);
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
	let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
	let year = yoe + era * 400 + i64::from(month <= 2);
	(year, month, day)
}

/// Format seconds since the unix epoch as `YYYY-MM-DD HH:MM` (UTC).
pub fn format_timestamp(secs: i64) -> String {
	let days = secs.div_euclid(86400);
	let rem = secs.rem_euclid(86400);
	let (year, month, day) = civil_from_days(days);
	format!(
		"{}-{:02}-{:02} {:02}:{:02}",
		year,
		month,
		day,
		rem / 3600,
		(rem % 3600) / 60
	)
}

/// The current time as `YYYY-MM-DD HH:MM` (UTC).
pub fn timestamp_now() -> String {
	let secs = match SystemTime::now().duration_since(UNIX_EPOCH) {
		Ok(d) => d.as_secs() as i64,
		Err(e) => -(e.duration().as_secs() as i64),
	};
	format_timestamp(secs)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builtin_defaults() {
		let cfg = WriterConfig::builtin();
		assert!(cfg.write_comment);
		assert!(cfg.write_timestamp);
		assert_eq!(cfg.library_name, "lx_xml");
		assert_eq!(cfg.library_version, env!("CARGO_PKG_VERSION"));
	}

	#[test]
	fn builder_switches() {
		let cfg = WriterConfig::builtin().with_comment(false).with_timestamp(false);
		assert!(!cfg.write_comment);
		assert!(!cfg.write_timestamp);
	}

	#[test]
	fn defaults_install_once() {
		let _ = WriterConfig::install_defaults(WriterConfig::builtin());
		match WriterConfig::install_defaults(WriterConfig::builtin().with_comment(false)) {
			Err(rejected) => assert!(!rejected.write_comment),
			Ok(()) => panic!("second install should be rejected"),
		}
		assert_eq!(WriterConfig::default(), WriterConfig::builtin());
	}

	#[test]
	fn timestamps() {
		assert_eq!(format_timestamp(0), "1970-01-01 00:00");
		assert_eq!(format_timestamp(951782400), "2000-02-29 00:00");
		assert_eq!(format_timestamp(1700000000), "2023-11-14 22:13");
		assert_eq!(format_timestamp(-60), "1969-12-31 23:59");
	}

	#[test]
	fn timestamp_now_has_fixed_shape() {
		let ts = timestamp_now();
		assert_eq!(ts.len(), 16);
		assert_eq!(&ts[4..5], "-");
		assert_eq!(&ts[10..11], " ");
		assert_eq!(&ts[13..14], ":");
	}
}
