//! Periodic status report sent over the serial link
//!
//! Each report is a single line of space-separated decimal values:
//! `<ticks> <cycles> <left> <right> <battery_mV>\n`.

use heapless::String;

/// Upper bound on the length of a formatted report
pub const LINE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct Report {
    pub ticks: u32,
    pub cycles: u32,
    pub left: u16,
    pub right: u16,
    pub battery_mv: u32,
}

impl Report {
    pub fn format(&self) -> String<LINE_LEN> {
        let mut line = String::new();
        // Longest possible line is 5 * 10 digits + 5 separators, always fits
        let _ = ufmt::uwrite!(line, "{} {} {} {} {}\n",
            self.ticks, self.cycles, self.left, self.right, self.battery_mv);
        line
    }

    /// Write the report to `buf`, truncating if it is too short
    ///
    /// Returns the number of bytes written.
    pub fn write_to(&self, buf: &mut [u8]) -> usize {
        let line = self.format();
        let len = line.len().min(buf.len());
        buf[..len].copy_from_slice(&line.as_bytes()[..len]);
        len
    }
}

/// Number of reports that could not be sent
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct TelemetryStats {
    pub sent: u32,
    pub dropped: u32,
}

impl TelemetryStats {
    pub fn record(&mut self, sent: bool) {
        if sent {
            self.sent = self.sent.wrapping_add(1);
        } else {
            self.dropped = self.dropped.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report { ticks: 1500, cycles: 252_000_000, left: 65535, right: 0, battery_mv: 7400 }
    }

    #[test]
    fn format_line() {
        assert_eq!(report().format().as_str(), "1500 252000000 65535 0 7400\n");
    }

    #[test]
    fn longest_line_fits() {
        let r = Report {
            ticks: u32::MAX,
            cycles: u32::MAX,
            left: u16::MAX,
            right: u16::MAX,
            battery_mv: u32::MAX,
        };
        let line = r.format();
        assert_eq!(line.as_str(), "4294967295 4294967295 65535 65535 4294967295\n");
    }

    #[test]
    fn write_to_buffer() {
        let mut buf = [0u8; LINE_LEN];
        let n = report().write_to(&mut buf);
        assert_eq!(&buf[..n], b"1500 252000000 65535 0 7400\n");
    }

    #[test]
    fn write_truncated() {
        let mut buf = [0u8; 4];
        assert_eq!(report().write_to(&mut buf), 4);
        assert_eq!(&buf, b"1500");
    }

    #[test]
    fn stats() {
        let mut stats = TelemetryStats::default();
        stats.record(true);
        stats.record(false);
        stats.record(true);
        assert_eq!(stats, TelemetryStats { sent: 2, dropped: 1 });
    }
}
