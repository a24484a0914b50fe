//! Flow-rate estimate from a monotonically increasing liter total.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Sample {
    at_ms: u64,
    liters: u64,
}

/// Best-guess flow in mL/s from the last three distinct liter totals.
///
/// Feed it on every pulse and on idle wake-ups; between pulses the estimate
/// decays and drops to zero once the meter has been silent for more than
/// twice the last per-liter interval.
#[derive(Debug, Clone, Default)]
pub struct FlowGauge {
    samples: [Sample; 3],
    len: usize,
    liters_per_ms: f64,
}

impl FlowGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_liters(&self) -> u64 {
        match self.len {
            0 => 0,
            n => self.samples[n - 1].liters,
        }
    }

    pub fn flow_mlps(&self) -> u32 {
        (self.liters_per_ms * 1_000_000.0) as u32
    }

    pub fn update(&mut self, at_ms: u64, liters: u64) {
        if self.len < 3 {
            if self.len == 0 || self.samples[self.len - 1].liters != liters {
                self.samples[self.len] = Sample { at_ms, liters };
                self.len += 1;
            }
            if self.len == 3 {
                self.recalculate();
            }
            return;
        }

        let [_, s1, s2] = self.samples;

        if liters != s2.liters {
            self.samples.rotate_left(1);
            self.samples[2] = Sample { at_ms, liters };
            self.recalculate();
            return;
        }

        // No new liters
        if self.liters_per_ms == 0.0 || at_ms <= s1.at_ms {
            return;
        }

        let last_delta = (s2.liters - s1.liters) as f64;
        let ms_per_liter = (s2.at_ms - s1.at_ms) as f64 / last_delta;
        let silent_ms = at_ms.saturating_sub(s2.at_ms) as f64;

        if silent_ms > ms_per_liter * 2.0 {
            self.liters_per_ms = 0.0;
        } else {
            self.liters_per_ms = last_delta / (at_ms - s1.at_ms) as f64;
        }
    }

    fn recalculate(&mut self) {
        let [s0, s1, s2] = self.samples;

        let t10 = s1.at_ms.saturating_sub(s0.at_ms).max(1) as f64;
        let t21 = s2.at_ms.saturating_sub(s1.at_ms).max(1) as f64;
        let p10 = s1.liters - s0.liters;
        let p21 = s2.liters - s1.liters;

        self.liters_per_ms = if p21 > p10 {
            // Speeding up: newest interval only
            p21 as f64 / t21
        } else if 0.8 < t21 / t10 && t21 / t10 < 1.2 {
            let t20 = s2.at_ms.saturating_sub(s0.at_ms).max(1) as f64;
            (s2.liters - s0.liters) as f64 / t20
        } else {
            p21 as f64 / t21
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(clock: &str) -> u64 {
        let mut parts = clock.split(':');
        let h: u64 = parts.next().unwrap().parse().unwrap();
        let m: u64 = parts.next().unwrap().parse().unwrap();
        let (s, frac) = parts.next().unwrap().split_once('.').unwrap();
        let s: u64 = s.parse().unwrap();
        let frac: u64 = frac.parse().unwrap();
        ((h * 60 + m) * 60 + s) * 1000 + frac
    }

    #[test]
    fn it_reports_zero_until_three_distinct_totals() {
        let mut gauge = FlowGauge::new();
        gauge.update(0, 0);
        gauge.update(1_000, 0);
        gauge.update(2_000, 1);
        assert_eq!(gauge.flow_mlps(), 0);
        assert_eq!(gauge.current_liters(), 1);
    }

    #[test]
    fn it_tracks_a_household_draw() {
        let inputs = [
            ("10:10:00.000", 0, 0),
            ("10:11:00.000", 0, 0),
            ("10:12:00.000", 0, 0),
            ("10:12:20.000", 1, 0),
            ("10:12:30.000", 1, 0),
            ("10:12:40.000", 1, 0),
            ("10:12:50.000", 1, 0),
            ("10:13:00.000", 2, 25),
            ("10:13:20.000", 3, 50),
            ("10:13:40.000", 4, 50),
            ("10:14:00.000", 5, 50),
            // Tap closed
            ("10:14:30.000", 5, 20),
            ("10:15:00.000", 5, 0),
            // Slow trickle
            ("10:15:30.000", 6, 11),
            ("10:16:00.000", 6, 8),
            ("10:16:30.000", 7, 16),
            ("10:17:00.000", 7, 11),
            ("10:17:30.000", 8, 16),
            ("10:18:00.000", 8, 11),
            // Burst, then an abrupt stop
            ("10:19:00.000", 8, 6),
            ("10:20:00.000", 12, 26),
            ("10:20:10.000", 16, 400),
            ("10:20:20.000", 16, 0),
            ("10:20:30.000", 16, 0),
        ];

        let mut gauge = FlowGauge::new();
        for (clock, liters, flow) in inputs {
            gauge.update(ms(clock), liters);
            assert_eq!(gauge.flow_mlps(), flow, "at {} with {} liters", clock, liters);
        }
    }

    #[test]
    fn same_millisecond_pulses_do_not_divide_by_zero() {
        let mut gauge = FlowGauge::new();
        gauge.update(100, 1);
        gauge.update(100, 2);
        gauge.update(100, 3);
        assert!(gauge.flow_mlps() > 0);
        gauge.update(100, 3);
    }
}
