//! Remotely tunable proportional gain.
//!
//! The network side writes, the control loop reads once per cycle. The value is
//! kept as the bit pattern of an `f32` inside an `AtomicU32`, so both sides do a
//! single word-sized load or store: no locks, no torn reads, last write wins.

use core::sync::atomic::{AtomicU32, Ordering};

/// Marker preceding the gain value in an inbound command payload.
pub const GAIN_KEY: &str = "\"kp\":";

pub struct GainParameter {
    bits: AtomicU32,
}

impl GainParameter {
    pub const fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(initial.to_bits()),
        }
    }

    /// Store a new gain. The value is not range-checked.
    pub fn set_gain(
        &self,
        value: f32,
    ) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get_gain(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl core::fmt::Debug for GainParameter {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        f.debug_tuple("GainParameter").field(&self.get_gain()).finish()
    }
}

/// Pull the gain out of an unstructured payload such as `{"kp": 3.5}`.
///
/// Finds the first `"kp":` marker, skips whitespace, and parses the longest
/// numeric prefix that follows. Returns `None` when the marker is missing or no
/// number follows it.
pub fn extract_gain(payload: &str) -> Option<f32> {
    let start = payload.find(GAIN_KEY)? + GAIN_KEY.len();
    let rest = payload[start..].trim_start();
    let len = numeric_prefix_len(rest.as_bytes());
    if len == 0 {
        return None;
    }
    rest[..len].parse::<f32>().ok()
}

/// Length of the leading `[+-]digits[.digits][(e|E)[+-]digits]` run.
fn numeric_prefix_len(s: &[u8]) -> usize {
    let digits = |from: usize| s[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut i = 0;
    if matches!(s.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int = digits(i);
    i += int;
    let mut frac = 0;
    if s.get(i) == Some(&b'.') {
        frac = digits(i + 1);
        if int > 0 || frac > 0 {
            i += 1 + frac;
        }
    }
    if int == 0 && frac == 0 {
        return 0;
    }
    if matches!(s.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(s.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp = digits(j);
        if exp > 0 {
            i = j + exp;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let gain = GainParameter::new(0.0);
        assert_eq!(gain.get_gain(), 0.0);
        gain.set_gain(3.5);
        assert_eq!(gain.get_gain(), 3.5);
        gain.set_gain(-1e6);
        assert_eq!(gain.get_gain(), -1e6);
    }

    #[test]
    fn concurrent_reads_see_only_written_values() {
        static GAIN: GainParameter = GainParameter::new(1.0);
        const VALUES: [f32; 4] = [1.0, -2.5, 3.0e-3, 123456.78];

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..20_000 {
                    GAIN.set_gain(VALUES[i % VALUES.len()]);
                }
            });
            s.spawn(|| {
                for _ in 0..20_000 {
                    let v = GAIN.get_gain();
                    assert!(VALUES.contains(&v), "torn read: {v}");
                }
            });
        });
    }

    #[test]
    fn extracts_value_after_marker() {
        assert_eq!(extract_gain(r#"{"kp":3.5}"#), Some(3.5));
        assert_eq!(extract_gain(r#"{"mode":"x", "kp":  -0.25 , "ki": 9}"#), Some(-0.25));
        assert_eq!(extract_gain(r#"{"kp":2e1}"#), Some(20.0));
        assert_eq!(extract_gain(r#"{"kp":.5}"#), Some(0.5));
        assert_eq!(extract_gain(r#"{"kp":7.}"#), Some(7.0));
        assert_eq!(extract_gain("junk \"kp\":1.5e junk"), Some(1.5));
    }

    #[test]
    fn missing_marker_or_number() {
        assert_eq!(extract_gain(r#"{"ki":3.5}"#), None);
        assert_eq!(extract_gain(r#"{"kp":"fast"}"#), None);
        assert_eq!(extract_gain(r#"{"kp":}"#), None);
        assert_eq!(extract_gain(r#"{"kp":-.}"#), None);
        assert_eq!(extract_gain(""), None);
    }
}
