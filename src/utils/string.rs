//! String utility functions

/// Format a byte rate with binary steps, e.g. `"1.50 MB/s"`
pub fn format_data_rate(bytes_per_second: f64) -> String {
    const KIB: f64 = 1024.0;
    let (value, unit) = if bytes_per_second < KIB {
        (bytes_per_second, "B/s")
    } else if bytes_per_second < KIB * KIB {
        (bytes_per_second / KIB, "kB/s")
    } else if bytes_per_second < KIB * KIB * KIB {
        (bytes_per_second / (KIB * KIB), "MB/s")
    } else {
        (bytes_per_second / (KIB * KIB * KIB), "GB/s")
    };
    format!("{:.2} {}", value, unit)
}

/// Format a byte count with binary steps, e.g. `"192.00 kB"`
pub fn format_bytes(bytes: u64) -> String {
    let rate = format_data_rate(bytes as f64);
    rate.trim_end_matches("/s").to_string()
}

/// Format seconds as HH:MM:SS
pub fn format_seconds(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;

    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_data_rate() {
        assert_eq!(format_data_rate(0.0), "0.00 B/s");
        assert_eq!(format_data_rate(1023.0), "1023.00 B/s");
        assert_eq!(format_data_rate(1024.0), "1.00 kB/s");
        assert_eq!(format_data_rate(1536.0 * 1024.0), "1.50 MB/s");
        assert_eq!(format_data_rate(2.0 * 1024.0 * 1024.0 * 1024.0), "2.00 GB/s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(196_608), "192.00 kB");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(3725), "1:02:05");
    }
}
