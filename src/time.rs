//! Wall-clock timestamps and strftime-style formatting.

use core::fmt::{self, Write};

use heapless::String;

use crate::config::STAMP_CAPACITY;

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const SECS_PER_DAY: u64 = 86_400;

/// A formatted timestamp, owned by the caller.
pub type Stamp = String<STAMP_CAPACITY>;

/// Calendar date and time of day with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DateTime {
    pub year: u16,
    /// 1..=12
    pub month: u8,
    /// 1..=31
    pub day: u8,
    /// 0 = Sunday
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

/// Time source shared by every channel of a listener.
pub trait Clock {
    /// Current wall-clock time, used for record and marker stamps.
    fn now(&self) -> DateTime;

    /// Monotonic milliseconds, used for idle timeouts.
    fn uptime_ms(&self) -> u64;
}

impl DateTime {
    /// Converts microseconds since 1970-01-01 00:00:00 UTC.
    pub fn from_epoch_micros(micros: u64) -> Self {
        let secs = micros / 1_000_000;
        let days = secs / SECS_PER_DAY;
        let rem = secs % SECS_PER_DAY;

        // Civil-from-days over 400-year eras, epoch shifted to 0000-03-01.
        let z = days + 719_468;
        let era = z / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + u64::from(month <= 2);

        Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            // 1970-01-01 was a Thursday
            weekday: ((days + 4) % 7) as u8,
            hour: (rem / 3600) as u8,
            minute: ((rem % 3600) / 60) as u8,
            second: (rem % 60) as u8,
            microsecond: (micros % 1_000_000) as u32,
        }
    }

    pub fn weekday_name(&self) -> &'static str {
        WEEKDAYS.get(usize::from(self.weekday)).copied().unwrap_or("?")
    }

    pub fn month_name(&self) -> &'static str {
        usize::from(self.month)
            .checked_sub(1)
            .and_then(|index| MONTHS.get(index))
            .copied()
            .unwrap_or("?")
    }

    fn write_token(&self, out: &mut impl Write, token: char) -> fmt::Result {
        match token {
            '%' => out.write_char('%'),
            'Y' => write!(out, "{}", self.year),
            'y' => write!(out, "{:02}", self.year % 100),
            'm' => write!(out, "{:02}", self.month),
            'd' => write!(out, "{:02}", self.day),
            'H' => write!(out, "{:02}", self.hour),
            'I' => write!(out, "{:02}", match self.hour % 12 {
                0 => 12,
                hour => hour,
            }),
            'p' => out.write_str(if self.hour < 12 { "AM" } else { "PM" }),
            'M' => write!(out, "{:02}", self.minute),
            'S' => write!(out, "{:02}", self.second),
            'f' => write!(out, "{:06}", self.microsecond),
            'w' => write!(out, "{}", self.weekday),
            'a' => out.write_str(abbreviate(self.weekday_name())),
            'A' => out.write_str(self.weekday_name()),
            'b' => out.write_str(abbreviate(self.month_name())),
            'B' => out.write_str(self.month_name()),
            _ => Ok(()),
        }
    }
}

fn abbreviate(name: &str) -> &str {
    name.get(..3).unwrap_or(name)
}

/// Formats `datetime` following a strftime-like `pattern`.
///
/// Supported tokens: `%Y %y %m %d %H %I %p %M %S %f %w %a %A %b %B %%`.
/// Unknown tokens produce nothing. Output that does not fit is cut at the
/// last token that fit completely.
pub fn format(datetime: &DateTime, pattern: &str) -> Stamp {
    let mut out = Stamp::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        let mut piece: String<16> = String::new();
        let written = if c == '%' {
            match chars.next() {
                Some(token) => datetime.write_token(&mut piece, token),
                None => break,
            }
        } else {
            piece.write_char(c)
        };

        if written.is_err() || out.push_str(&piece).is_err() {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DateTime {
        DateTime {
            year: 2024,
            month: 3,
            day: 5,
            weekday: 2,
            hour: 14,
            minute: 7,
            second: 9,
            microsecond: 123,
        }
    }

    #[test]
    fn formats_record_stamp() {
        let stamp = format(&sample(), crate::config::STAMP_FORMAT);
        assert_eq!(stamp.as_str(), "2024/03/05\t14:07:09.000123\t");
    }

    #[test]
    fn formats_names_and_twelve_hour_clock() {
        let stamp = format(&sample(), "%a %A %b %B %I%p %w %y %%");
        assert_eq!(stamp.as_str(), "Tue Tuesday Mar March 02PM 2 24 %");

        let midnight = DateTime { hour: 0, ..sample() };
        assert_eq!(format(&midnight, "%I %p").as_str(), "12 AM");
    }

    #[test]
    fn unknown_token_and_trailing_percent_are_dropped() {
        assert_eq!(format(&sample(), "x%qy%").as_str(), "xy");
    }

    #[test]
    fn out_of_range_fields_do_not_panic() {
        let bogus = DateTime { month: 0, weekday: 9, ..sample() };
        assert_eq!(format(&bogus, "%a %B").as_str(), "? ?");
    }

    #[test]
    fn truncates_at_last_whole_token() {
        // 13 x "%B" for September overflows 64 bytes after 7 names
        let stamp = format(&DateTime { month: 9, ..sample() }, "%B%B%B%B%B%B%B%B%B%B%B%B%B");
        assert_eq!(stamp.len(), 7 * "September".len());
    }

    #[test]
    fn converts_epoch_micros() {
        let epoch = DateTime::from_epoch_micros(0);
        assert_eq!((epoch.year, epoch.month, epoch.day, epoch.weekday), (1970, 1, 1, 4));

        let boot = DateTime::from_epoch_micros(crate::config::BOOT_EPOCH_SECS * 1_000_000 + 42);
        assert_eq!((boot.year, boot.month, boot.day, boot.weekday), (2025, 1, 1, 3));
        assert_eq!(boot.microsecond, 42);

        let leap = DateTime::from_epoch_micros((951_782_400 + 3_723) * 1_000_000);
        assert_eq!((leap.year, leap.month, leap.day), (2000, 2, 29));
        assert_eq!((leap.hour, leap.minute, leap.second), (1, 2, 3));
    }
}
