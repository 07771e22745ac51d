//! Utility functions for the metadata tooling

use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Formats a byte size into a human-readable string
///
/// # Examples
///
/// ```
/// use common::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", value, UNITS[unit])
}

/// Formats a short duration as milliseconds with one decimal
///
/// # Examples
///
/// ```
/// use common::utils::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}ms", duration.as_secs_f64() * 1000.0)
}

/// Measures the execution time of a function
pub fn measure_execution_time<T, F>(f: F) -> Result<(T, Duration)>
where
    F: FnOnce() -> Result<T>,
{
    let start = Instant::now();
    let result = f()?;
    Ok((result, start.elapsed()))
}

/// Returns the final component of a path as an owned string
///
/// # Examples
///
/// ```
/// use common::utils::file_name_of;
/// use std::path::Path;
///
/// assert_eq!(file_name_of(Path::new("out/labels.txt")).unwrap(), "labels.txt");
/// ```
pub fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Construction(format!("path has no usable file name: {}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_largest_unit() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn file_name_of_rejects_root() {
        assert!(file_name_of(Path::new("/")).is_err());
    }

    #[test]
    fn measure_execution_time_propagates_errors() {
        let result: Result<((), Duration)> =
            measure_execution_time(|| Err(Error::Internal("boom".into())));
        assert!(result.is_err());
    }
}
