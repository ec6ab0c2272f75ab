use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stats::clamp_score;

/// Tolerance applied to every inclusive score gate so that weighted sums like
/// `0.6 * 90 + 0.3 * 80 + 0.1 * 60` compare equal to their exact decimal value.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Inclusive threshold comparison used by every gate in the pipeline.
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score + SCORE_EPSILON >= threshold
}

/// Raw per-instrument inputs for a single run.
///
/// Every metric is optional: the external data layer may return partial
/// records, and the scorer decides whether enough is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSnapshot {
    pub symbol: String,

    // Fundamentals
    pub pe_ratio: Option<f64>,
    /// Year-over-year revenue growth, percent
    pub revenue_growth: Option<f64>,
    /// Net profit margin, percent
    pub profit_margin: Option<f64>,
    /// Return on equity, percent
    pub roe: Option<f64>,
    pub debt_to_equity: Option<f64>,

    // Momentum
    /// Percent distance of price from its long moving average
    pub trend_strength: Option<f64>,
    pub rsi: Option<f64>,
    /// Recent volume divided by average volume
    pub volume_trend: Option<f64>,
    /// Percent out/under-performance versus the benchmark
    pub relative_strength: Option<f64>,

    // Risk
    pub beta: Option<f64>,
    /// Maximum drawdown magnitude, percent (positive)
    pub max_drawdown: Option<f64>,
    pub sharpe_ratio: Option<f64>,

    // Sentiment
    /// Institutional ownership, percent
    pub institutional_ownership: Option<f64>,
    /// Analyst consensus on a 1 (strong sell) to 5 (strong buy) scale
    pub analyst_consensus: Option<f64>,
    /// Consensus price target upside, percent
    pub target_upside: Option<f64>,

    // Supplemental inputs for the ensemble and guardrail
    pub price: Option<f64>,
    pub avg_dollar_volume: Option<f64>,
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
    /// Annualized volatility, percent
    pub volatility: Option<f64>,
    pub sector: Option<String>,
}

impl FeatureSnapshot {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }
}

/// Coarse market condition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Bull,
    #[default]
    Neutral,
    Bear,
}

impl MarketRegime {
    pub fn score(&self) -> f64 {
        match self {
            MarketRegime::Bull => 1.0,
            MarketRegime::Neutral => 0.0,
            MarketRegime::Bear => -1.0,
        }
    }

    /// Derive a regime from a volatility index level and the prevailing trend,
    /// for hosts that do not supply an explicit label.
    pub fn from_indicators(volatility_index: f64, trend: TrendDirection) -> Self {
        if volatility_index >= 30.0 || (trend == TrendDirection::Down && volatility_index >= 20.0) {
            MarketRegime::Bear
        } else if trend == TrendDirection::Up && volatility_index < 20.0 {
            MarketRegime::Bull
        } else {
            MarketRegime::Neutral
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Neutral => "neutral",
            MarketRegime::Bear => "bear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    #[default]
    Sideways,
    Down,
}

impl TrendDirection {
    pub fn score(&self) -> f64 {
        match self {
            TrendDirection::Up => 1.0,
            TrendDirection::Sideways => 0.0,
            TrendDirection::Down => -1.0,
        }
    }
}

/// Global market snapshot for a run. Read-only input to the ensemble and guardrail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketContext {
    /// Volatility index level (VIX-style)
    pub volatility_index: f64,
    pub regime: MarketRegime,
    pub trend: TrendDirection,
    /// Sector name -> recent sector momentum, percent
    pub sector_momentum: BTreeMap<String, f64>,
    pub as_of: Option<DateTime<Utc>>,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            volatility_index: 18.0,
            regime: MarketRegime::Neutral,
            trend: TrendDirection::Sideways,
            sector_momentum: BTreeMap::new(),
            as_of: None,
        }
    }
}

impl MarketContext {
    pub fn sector_momentum_for(&self, sector: Option<&str>) -> Option<f64> {
        sector.and_then(|s| self.sector_momentum.get(s).copied())
    }
}

/// The four quality categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fundamentals,
    Momentum,
    Risk,
    Sentiment,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Fundamentals,
        Category::Momentum,
        Category::Risk,
        Category::Sentiment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Fundamentals => "fundamentals",
            Category::Momentum => "momentum",
            Category::Risk => "risk",
            Category::Sentiment => "sentiment",
        }
    }
}

/// One weight per category. Used both for the intrinsic quality blend and
/// for each perspective's re-weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub fundamentals: f64,
    pub momentum: f64,
    pub risk: f64,
    pub sentiment: f64,
}

impl CategoryWeights {
    pub const fn new(fundamentals: f64, momentum: f64, risk: f64, sentiment: f64) -> Self {
        Self {
            fundamentals,
            momentum,
            risk,
            sentiment,
        }
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Fundamentals => self.fundamentals,
            Category::Momentum => self.momentum,
            Category::Risk => self.risk,
            Category::Sentiment => self.sentiment,
        }
    }

    pub fn sum(&self) -> f64 {
        self.fundamentals + self.momentum + self.risk + self.sentiment
    }

    pub fn has_negative(&self) -> bool {
        Category::ALL.iter().any(|c| self.get(*c) < 0.0)
    }

    /// Weighted sum of the four category scores of `quality`.
    pub fn apply(&self, quality: &QualityScore) -> f64 {
        Category::ALL
            .iter()
            .map(|c| self.get(*c) * quality.category(*c))
            .sum()
    }
}

/// Letter grade. Declared worst to best so that `Ord` follows quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    F,
    D,
    #[serde(rename = "C-")]
    CMinus,
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B-")]
    BMinus,
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A-")]
    AMinus,
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Grade::APlus,
            s if s >= 85.0 => Grade::A,
            s if s >= 80.0 => Grade::AMinus,
            s if s >= 75.0 => Grade::BPlus,
            s if s >= 70.0 => Grade::B,
            s if s >= 65.0 => Grade::BMinus,
            s if s >= 60.0 => Grade::CPlus,
            s if s >= 55.0 => Grade::C,
            s if s >= 50.0 => Grade::CMinus,
            s if s >= 40.0 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// A category score with its grade. The grade is only ever derived from the
/// stored score inside the constructor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryScore {
    score: f64,
    grade: Grade,
}

impl CategoryScore {
    pub fn new(score: f64) -> Self {
        let score = clamp_score(score);
        Self {
            score,
            grade: Grade::from_score(score),
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }
}

/// Composite quality score for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityScore {
    symbol: String,
    overall: f64,
    grade: Grade,
    fundamentals: CategoryScore,
    momentum: CategoryScore,
    risk: CategoryScore,
    sentiment: CategoryScore,
    imputed_fields: Vec<String>,
}

impl QualityScore {
    /// Build a quality score from raw category scores. The overall score is the
    /// `weights` blend of the (clamped) categories, clamped to 0-100.
    pub fn new(
        symbol: impl Into<String>,
        weights: &CategoryWeights,
        fundamentals: f64,
        momentum: f64,
        risk: f64,
        sentiment: f64,
        imputed_fields: Vec<String>,
    ) -> Self {
        let fundamentals = CategoryScore::new(fundamentals);
        let momentum = CategoryScore::new(momentum);
        let risk = CategoryScore::new(risk);
        let sentiment = CategoryScore::new(sentiment);
        let overall = clamp_score(
            weights.fundamentals * fundamentals.score()
                + weights.momentum * momentum.score()
                + weights.risk * risk.score()
                + weights.sentiment * sentiment.score(),
        );
        Self {
            symbol: symbol.into(),
            overall,
            grade: Grade::from_score(overall),
            fundamentals,
            momentum,
            risk,
            sentiment,
            imputed_fields,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn category_score(&self, category: Category) -> CategoryScore {
        match category {
            Category::Fundamentals => self.fundamentals,
            Category::Momentum => self.momentum,
            Category::Risk => self.risk,
            Category::Sentiment => self.sentiment,
        }
    }

    pub fn category(&self, category: Category) -> f64 {
        self.category_score(category).score()
    }

    /// True when at least one field was imputed with the neutral default.
    pub fn is_partial(&self) -> bool {
        !self.imputed_fields.is_empty()
    }

    pub fn imputed_fields(&self) -> &[String] {
        &self.imputed_fields
    }
}

/// Pass / buy / strong-buy cut-offs of a perspective, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub pass: f64,
    pub buy: f64,
    pub strong_buy: f64,
}

/// Per-perspective recommendation level, declared worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Avoid,
    Hold,
    WeakBuy,
    Buy,
    StrongBuy,
}

impl Recommendation {
    /// The only place a recommendation is derived from a score.
    ///
    /// STRONG_BUY >= strong_buy, BUY >= buy, WEAK_BUY >= buy - weak_buy_margin,
    /// HOLD >= pass, AVOID otherwise.
    pub fn classify(weighted_score: f64, thresholds: &Thresholds, weak_buy_margin: f64) -> Self {
        if meets_threshold(weighted_score, thresholds.strong_buy) {
            Recommendation::StrongBuy
        } else if meets_threshold(weighted_score, thresholds.buy) {
            Recommendation::Buy
        } else if meets_threshold(weighted_score, thresholds.buy - weak_buy_margin) {
            Recommendation::WeakBuy
        } else if meets_threshold(weighted_score, thresholds.pass) {
            Recommendation::Hold
        } else {
            Recommendation::Avoid
        }
    }

    pub fn is_buy_or_better(&self) -> bool {
        matches!(self, Recommendation::Buy | Recommendation::StrongBuy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Avoid => "AVOID",
            Recommendation::Hold => "HOLD",
            Recommendation::WeakBuy => "WEAK_BUY",
            Recommendation::Buy => "BUY",
            Recommendation::StrongBuy => "STRONG_BUY",
        }
    }
}

/// The four investment-style perspectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerspectiveKind {
    Institutional,
    HedgeFund,
    QuantValue,
    RiskManaged,
}

impl PerspectiveKind {
    pub const ALL: [PerspectiveKind; 4] = [
        PerspectiveKind::Institutional,
        PerspectiveKind::HedgeFund,
        PerspectiveKind::QuantValue,
        PerspectiveKind::RiskManaged,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PerspectiveKind::Institutional => "Institutional",
            PerspectiveKind::HedgeFund => "Hedge Fund",
            PerspectiveKind::QuantValue => "Quant Value",
            PerspectiveKind::RiskManaged => "Risk-Managed",
        }
    }
}

/// Outcome of one perspective on one quality score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerspectiveVerdict {
    perspective: PerspectiveKind,
    weighted_score: f64,
    recommendation: Recommendation,
}

impl PerspectiveVerdict {
    /// The recommendation is always classified from `weighted_score` here, so a
    /// verdict can never carry a label that disagrees with its score.
    pub fn new(
        perspective: PerspectiveKind,
        weighted_score: f64,
        thresholds: &Thresholds,
        weak_buy_margin: f64,
    ) -> Self {
        Self {
            perspective,
            weighted_score,
            recommendation: Recommendation::classify(weighted_score, thresholds, weak_buy_margin),
        }
    }

    pub fn perspective(&self) -> PerspectiveKind {
        self.perspective
    }

    pub fn weighted_score(&self) -> f64 {
        self.weighted_score
    }

    pub fn recommendation(&self) -> Recommendation {
        self.recommendation
    }
}

/// Consensus bucket, declared best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusTier {
    StrongBuy,
    Buy,
    WeakBuy,
}

impl ConsensusTier {
    pub fn label(&self) -> &'static str {
        match self {
            ConsensusTier::StrongBuy => "STRONG BUY",
            ConsensusTier::Buy => "BUY",
            ConsensusTier::WeakBuy => "WEAK BUY",
        }
    }

    /// Agreement count that maps to this tier.
    pub fn agreement(&self) -> u8 {
        match self {
            ConsensusTier::StrongBuy => 4,
            ConsensusTier::Buy => 3,
            ConsensusTier::WeakBuy => 2,
        }
    }

    pub fn from_agreement(agreement_count: u8) -> Option<Self> {
        match agreement_count {
            4 => Some(ConsensusTier::StrongBuy),
            3 => Some(ConsensusTier::Buy),
            2 => Some(ConsensusTier::WeakBuy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model: String,
    /// Predicted return, percent
    pub expected_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub feature: String,
    /// Signed contribution to the ensemble expected return, percent
    pub contribution: f64,
}

/// Ensemble prediction for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutput {
    pub model_predictions: Vec<ModelPrediction>,
    /// Weighted expected return, percent
    pub expected_return: f64,
    /// Probability the pick succeeds, (0, 1)
    pub probability: f64,
    /// Inverse of cross-model disagreement, (0, 1]
    pub confidence: f64,
    pub attributions: Vec<FeatureAttribution>,
}
