use std::time::Duration;

/// Pretty format a `Duration` like `3h 07m`, `12m 05s`, or `42s`.
pub fn fmt_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, rem) = (total / 3600, total % 3600);
    let (m, s) = (rem / 60, rem % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_magnitude() {
        assert_eq!(fmt_duration(Duration::from_secs(42)), "42s");
        assert_eq!(fmt_duration(Duration::from_secs(725)), "12m 05s");
        assert_eq!(fmt_duration(Duration::from_secs(3 * 3600 + 7 * 60)), "3h 07m");
    }
}
