//! Ensemble feature vector.
//!
//! Every dimension is centred so that a missing input maps to 0.

use analysis_core::{Category, FeatureSnapshot, MarketContext, QualityScore};

pub const FEATURE_COUNT: usize = 27;

pub type Features = [f64; FEATURE_COUNT];

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // quality
    "quality_overall",
    "quality_fundamentals",
    "quality_momentum",
    "quality_risk",
    "quality_sentiment",
    // fundamentals
    "earnings_yield",
    "revenue_growth",
    "profit_margin",
    "return_on_equity",
    "leverage",
    // price / volume
    "trend_strength",
    "rsi_distance",
    "volume_trend",
    "relative_strength",
    "return_1m",
    "return_3m",
    "volatility",
    // risk
    "beta_excess",
    "drawdown",
    "sharpe_ratio",
    // sentiment
    "analyst_consensus",
    "target_upside",
    // market context
    "volatility_index",
    "regime",
    "market_trend",
    "low_volatility",
    "sector_momentum",
];

/// VIX-style level below which the market counts as calm
pub const LOW_VOLATILITY_LEVEL: f64 = 15.0;

/// Overall plus four category scores, 0-100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityParts {
    pub overall: f64,
    pub fundamentals: f64,
    pub momentum: f64,
    pub risk: f64,
    pub sentiment: f64,
}

impl From<&QualityScore> for QualityParts {
    fn from(q: &QualityScore) -> Self {
        Self {
            overall: q.overall(),
            fundamentals: q.category(Category::Fundamentals),
            momentum: q.category(Category::Momentum),
            risk: q.category(Category::Risk),
            sentiment: q.category(Category::Sentiment),
        }
    }
}

fn centred(value: Option<f64>, centre: f64, scale: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => (v - centre) / scale,
        _ => 0.0,
    }
}

fn score_feature(score: f64) -> f64 {
    (score - 50.0) / 10.0
}

pub fn extract(quality: &QualityScore, snapshot: &FeatureSnapshot, market: &MarketContext) -> Features {
    extract_parts(QualityParts::from(quality), snapshot, market)
}

pub fn extract_parts(quality: QualityParts, s: &FeatureSnapshot, market: &MarketContext) -> Features {
    let earnings_yield = s
        .pe_ratio
        .filter(|pe| pe.is_finite())
        .map(|pe| if pe > 0.0 { 100.0 / pe } else { 0.0 });

    [
        score_feature(quality.overall),
        score_feature(quality.fundamentals),
        score_feature(quality.momentum),
        score_feature(quality.risk),
        score_feature(quality.sentiment),
        centred(earnings_yield, 5.0, 5.0),
        centred(s.revenue_growth, 0.0, 10.0),
        centred(s.profit_margin, 0.0, 10.0),
        centred(s.roe, 0.0, 10.0),
        centred(s.debt_to_equity, 1.0, 1.0),
        centred(s.trend_strength, 0.0, 10.0),
        centred(s.rsi, 50.0, 10.0),
        centred(s.volume_trend, 1.0, 1.0),
        centred(s.relative_strength, 0.0, 10.0),
        centred(s.return_1m, 0.0, 10.0),
        centred(s.return_3m, 0.0, 10.0),
        centred(s.volatility, 25.0, 10.0),
        centred(s.beta, 1.0, 1.0),
        centred(s.max_drawdown.map(f64::abs), 20.0, 10.0),
        centred(s.sharpe_ratio, 0.0, 1.0),
        centred(s.analyst_consensus, 3.0, 1.0),
        centred(s.target_upside, 0.0, 10.0),
        (market.volatility_index - 20.0) / 10.0,
        market.regime.score(),
        market.trend.score(),
        if market.volatility_index < LOW_VOLATILITY_LEVEL { 1.0 } else { 0.0 },
        centred(market.sector_momentum_for(s.sector.as_deref()), 0.0, 10.0),
    ]
}
