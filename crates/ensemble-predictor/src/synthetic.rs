//! Seeded synthetic priors for cold-start training.
//!
//! Labelled samples are drawn so that expected return rises with quality.
//! The generator is a pure function of `(samples, seed)`.

use analysis_core::{AnalysisError, FeatureSnapshot, MarketContext, MarketRegime, TrendDirection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

use crate::features::{extract_parts, Features, QualityParts, FEATURE_COUNT};

pub const QUALITY_MEAN: f64 = 60.0;
pub const QUALITY_STD: f64 = 15.0;
/// Spread of each category score around the overall quality
pub const CATEGORY_NOISE_STD: f64 = 8.0;
/// Expected return (percent) of an instrument at `QUALITY_MEAN`
pub const TARGET_INTERCEPT: f64 = 2.0;
/// Expected return gained per quality point above `QUALITY_MEAN`
pub const TARGET_SLOPE: f64 = 0.25;
pub const TARGET_NOISE_STD: f64 = 4.0;

pub const VIX_MEAN: f64 = 19.0;
pub const VIX_STD: f64 = 6.0;
pub const SECTOR_MOMENTUM_STD: f64 = 4.0;

const SYNTHETIC_SECTOR: &str = "Synthetic";

/// Labelled training rows. Targets are expected returns in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub features: Vec<Features>,
    pub targets: Vec<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Column means of the feature matrix.
    pub fn feature_means(&self) -> Features {
        let n = self.features.len().max(1) as f64;
        let mut means = [0.0; FEATURE_COUNT];
        for row in &self.features {
            for (m, v) in means.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);
        means
    }
}

struct Sampler {
    rng: StdRng,
    normal: Normal,
}

impl Sampler {
    fn new(seed: u64) -> Result<Self, AnalysisError> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::ModelUnavailable(format!("normal distribution: {e}")))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            normal,
        })
    }

    fn gauss(&mut self, mean: f64, std: f64) -> f64 {
        mean + std * self.rng.sample(&self.normal)
    }

    /// Linear interpolation between `worst` and `best` by a 0-100 score, plus noise.
    fn from_score(&mut self, score: f64, worst: f64, best: f64, noise: f64) -> f64 {
        worst + (best - worst) * score / 100.0 + self.gauss(0.0, noise)
    }
}

/// Draw `samples` labelled rows from the synthetic prior.
pub fn generate(samples: usize, seed: u64) -> Result<TrainingSet, AnalysisError> {
    if samples == 0 {
        return Err(AnalysisError::ModelUnavailable(
            "synthetic sample count must be positive".to_string(),
        ));
    }
    let mut s = Sampler::new(seed)?;
    let mut features = Vec::with_capacity(samples);
    let mut targets = Vec::with_capacity(samples);

    for _ in 0..samples {
        let quality = s.gauss(QUALITY_MEAN, QUALITY_STD).clamp(0.0, 100.0);
        let mut category = || (quality + s.gauss(0.0, CATEGORY_NOISE_STD)).clamp(0.0, 100.0);
        let parts = QualityParts {
            overall: quality,
            fundamentals: category(),
            momentum: category(),
            risk: category(),
            sentiment: category(),
        };

        let snapshot = raw_fields(&mut s, &parts);
        let market = market_context(&mut s);
        features.push(extract_parts(parts, &snapshot, &market));
        targets.push(
            TARGET_INTERCEPT + TARGET_SLOPE * (quality - QUALITY_MEAN) + s.gauss(0.0, TARGET_NOISE_STD),
        );
    }

    Ok(TrainingSet { features, targets })
}

fn raw_fields(s: &mut Sampler, q: &QualityParts) -> FeatureSnapshot {
    let (f, m, r, sent) = (q.fundamentals, q.momentum, q.risk, q.sentiment);
    FeatureSnapshot {
        pe_ratio: Some(s.from_score(f, 40.0, 14.0, 4.0)),
        revenue_growth: Some(s.from_score(f, -10.0, 30.0, 5.0)),
        profit_margin: Some(s.from_score(f, -5.0, 25.0, 3.0)),
        roe: Some(s.from_score(f, 0.0, 25.0, 4.0)),
        debt_to_equity: Some(s.from_score(f, 3.0, 0.2, 0.3).max(0.0)),
        trend_strength: Some(s.from_score(m, -20.0, 20.0, 4.0)),
        rsi: Some(s.from_score(m, 30.0, 65.0, 5.0).clamp(0.0, 100.0)),
        volume_trend: Some(s.from_score(m, 0.6, 1.6, 0.15).max(0.0)),
        relative_strength: Some(s.from_score(m, -15.0, 15.0, 3.0)),
        return_1m: Some(s.from_score(m, -6.0, 6.0, 3.0)),
        return_3m: Some(s.from_score(m, -12.0, 12.0, 5.0)),
        volatility: Some(s.from_score(r, 60.0, 15.0, 5.0).max(1.0)),
        beta: Some(s.from_score(r, 1.8, 0.8, 0.15)),
        max_drawdown: Some(s.from_score(r, 50.0, 5.0, 4.0).abs()),
        sharpe_ratio: Some(s.from_score(r, -0.5, 2.0, 0.3)),
        analyst_consensus: Some(s.from_score(sent, 1.0, 5.0, 0.3).clamp(1.0, 5.0)),
        target_upside: Some(s.from_score(sent, -20.0, 30.0, 5.0)),
        sector: Some(SYNTHETIC_SECTOR.to_string()),
        ..FeatureSnapshot::new("SYNTH")
    }
}

fn market_context(s: &mut Sampler) -> MarketContext {
    let volatility_index = s.gauss(VIX_MEAN, VIX_STD).clamp(9.0, 60.0);
    let trend = match s.rng.gen_range(0..3) {
        0 => TrendDirection::Down,
        1 => TrendDirection::Sideways,
        _ => TrendDirection::Up,
    };
    let mut market = MarketContext {
        volatility_index,
        regime: MarketRegime::from_indicators(volatility_index, trend),
        trend,
        ..Default::default()
    };
    market
        .sector_momentum
        .insert(SYNTHETIC_SECTOR.to_string(), s.gauss(0.0, SECTOR_MOMENTUM_STD));
    market
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::stats::mean;

    #[test]
    fn test_same_seed_same_samples() {
        assert_eq!(generate(200, 7).unwrap(), generate(200, 7).unwrap());
        assert_ne!(generate(200, 7).unwrap(), generate(200, 8).unwrap());
    }

    #[test]
    fn test_target_statistics() {
        let set = generate(2000, 42).unwrap();
        assert_eq!(set.len(), 2000);
        let m = mean(&set.targets);
        assert!((m - TARGET_INTERCEPT).abs() < 0.6, "target mean {m}");
        // overall quality feature is centred at 50 and scaled by 10
        let q: Vec<f64> = set.features.iter().map(|f| f[0] * 10.0 + 50.0).collect();
        assert!((mean(&q) - QUALITY_MEAN).abs() < 1.5);
        assert!(q.iter().all(|v| *v > -1e-9 && *v < 100.0 + 1e-9));
    }

    #[test]
    fn test_zero_samples_rejected() {
        assert!(matches!(generate(0, 1), Err(AnalysisError::ModelUnavailable(_))));
    }
}
