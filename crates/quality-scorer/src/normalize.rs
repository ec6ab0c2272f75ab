//! Reference-band normalization of raw metrics onto 0-100.

/// How a raw metric maps onto the 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    /// 100 inside `[ideal_low, ideal_high]`, linear decay to 0 at `floor` and `ceiling`
    Band {
        floor: f64,
        ideal_low: f64,
        ideal_high: f64,
        ceiling: f64,
    },
    /// Linear from 0 at `worst` to 100 at `best`, clamped. `worst > best` for
    /// lower-is-better metrics.
    Linear { worst: f64, best: f64 },
}

/// Values that short-circuit to 0 before the curve is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Guard {
    None,
    /// Non-positive values score 0 (negative earnings P/E)
    Positive,
    /// Negative values score 0 (negative equity D/E)
    NonNegative,
}

impl Curve {
    pub fn score(&self, value: f64, guard: Guard) -> f64 {
        match guard {
            Guard::Positive if value <= 0.0 => return 0.0,
            Guard::NonNegative if value < 0.0 => return 0.0,
            _ => {}
        }
        match *self {
            Curve::Band {
                floor,
                ideal_low,
                ideal_high,
                ceiling,
            } => band_score(value, floor, ideal_low, ideal_high, ceiling),
            Curve::Linear { worst, best } => linear_score(value, worst, best),
        }
    }
}

pub fn band_score(value: f64, floor: f64, ideal_low: f64, ideal_high: f64, ceiling: f64) -> f64 {
    if value >= ideal_low && value <= ideal_high {
        100.0
    } else if value < ideal_low {
        if value <= floor {
            0.0
        } else {
            100.0 * (value - floor) / (ideal_low - floor)
        }
    } else if value >= ceiling {
        0.0
    } else {
        100.0 * (ceiling - value) / (ceiling - ideal_high)
    }
}

pub fn linear_score(value: f64, worst: f64, best: f64) -> f64 {
    if (best - worst).abs() < f64::EPSILON {
        return 50.0;
    }
    let t = ((value - worst) / (best - worst)).clamp(0.0, 1.0);
    t * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_score() {
        assert_eq!(band_score(15.0, 3.0, 12.0, 20.0, 60.0), 100.0);
        assert_eq!(band_score(12.0, 3.0, 12.0, 20.0, 60.0), 100.0);
        assert_relative_eq!(band_score(7.5, 3.0, 12.0, 20.0, 60.0), 50.0, epsilon = 1e-9);
        assert_relative_eq!(band_score(40.0, 3.0, 12.0, 20.0, 60.0), 50.0, epsilon = 1e-9);
        assert_eq!(band_score(2.0, 3.0, 12.0, 20.0, 60.0), 0.0);
        assert_eq!(band_score(75.0, 3.0, 12.0, 20.0, 60.0), 0.0);
    }

    #[test]
    fn test_linear_score_both_directions() {
        assert_relative_eq!(linear_score(10.0, -10.0, 30.0), 50.0, epsilon = 1e-9);
        assert_eq!(linear_score(50.0, -10.0, 30.0), 100.0);
        // lower is better
        assert_relative_eq!(linear_score(1.6, 3.0, 0.2), 50.0, epsilon = 1e-9);
        assert_eq!(linear_score(0.0, 3.0, 0.2), 100.0);
        assert_eq!(linear_score(4.0, 3.0, 0.2), 0.0);
    }

    #[test]
    fn test_guards() {
        let pe = Curve::Band { floor: 3.0, ideal_low: 12.0, ideal_high: 20.0, ceiling: 60.0 };
        assert_eq!(pe.score(-8.0, Guard::Positive), 0.0);
        assert_eq!(pe.score(0.0, Guard::Positive), 0.0);
        let de = Curve::Linear { worst: 3.0, best: 0.2 };
        assert_eq!(de.score(-1.0, Guard::NonNegative), 0.0);
        assert_eq!(de.score(-1.0, Guard::None), 100.0);
    }
}
