//! 📸 Market Snapshot - The engine's read-only input contract
//!
//! One snapshot = one symbol, one open position, one set of per-timeframe
//! indicators plus the ML prediction and account/risk context. Produced
//! upstream by the feature/inference service; every optional field carries
//! a documented default so a sparse snapshot degrades instead of failing.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "SHORT")]
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short
    pub fn direction(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

/// ML model directional call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MlDirection {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl Default for MlDirection {
    fn default() -> Self {
        MlDirection::Hold
    }
}

/// Chart timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    /// Timeframes the decision core actually scans. M1/M5 are too noisy
    /// for the holding horizon and are excluded.
    pub const DECISION: [Timeframe; 5] = [
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Higher timeframes that anchor the position thesis.
    pub const HTF: [Timeframe; 3] = [Timeframe::H1, Timeframe::H4, Timeframe::D1];
}

/// Indicator set computed upstream for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeIndicators {
    /// Trend direction, 0.0 = fully bearish, 1.0 = fully bullish.
    /// Exactly 0.0 on every HTF is the missing-data signal.
    pub trend: f64,

    /// Momentum, -1.0 (hard down) to +1.0 (hard up)
    pub momentum: f64,

    /// RSI, 0-100 (default: 50 = neutral)
    pub rsi: f64,

    /// MACD histogram value in price units
    pub macd: f64,

    /// Position within the Bollinger band, 0.0 = lower band, 1.0 = upper
    pub bollinger_position: f64,

    /// ATR in price units
    pub atr: f64,

    /// ADX trend strength, 0-100
    pub adx: f64,

    /// Volume trend, -1.0 (drying up) to +1.0 (expanding)
    pub volume_trend: f64,
}

impl Default for TimeframeIndicators {
    fn default() -> Self {
        Self {
            trend: 0.0,
            momentum: 0.0,
            rsi: 50.0,
            macd: 0.0,
            bollinger_position: 0.5,
            atr: 0.0,
            adx: 25.0,
            volume_trend: 0.0,
        }
    }
}

/// Per-timeframe indicators for the whole ladder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeSet {
    pub m1: TimeframeIndicators,
    pub m5: TimeframeIndicators,
    pub m15: TimeframeIndicators,
    pub m30: TimeframeIndicators,
    pub h1: TimeframeIndicators,
    pub h4: TimeframeIndicators,
    pub d1: TimeframeIndicators,
}

impl TimeframeSet {
    pub fn get(&self, tf: Timeframe) -> &TimeframeIndicators {
        match tf {
            Timeframe::M1 => &self.m1,
            Timeframe::M5 => &self.m5,
            Timeframe::M15 => &self.m15,
            Timeframe::M30 => &self.m30,
            Timeframe::H1 => &self.h1,
            Timeframe::H4 => &self.h4,
            Timeframe::D1 => &self.d1,
        }
    }
}

/// The open position under management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionInfo {
    pub side: Side,

    /// Position size in lots
    pub volume: f64,

    pub entry_price: f64,

    /// Minutes since the position was opened
    pub age_minutes: f64,

    /// Current stop loss price (0.0 = none set)
    pub stop_loss: f64,

    /// Current take profit price (0.0 = none set)
    pub take_profit: f64,

    /// Accumulated swap/rollover cost in account currency (usually negative)
    pub swap: f64,
}

impl Default for PositionInfo {
    fn default() -> Self {
        Self {
            side: Side::Long,
            volume: 0.0,
            entry_price: 0.0,
            age_minutes: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            swap: 0.0,
        }
    }
}

/// Cross-timeframe agreement metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentMetrics {
    /// 0.0 = timeframes fully conflicted, 1.0 = all agree
    pub alignment_score: f64,

    /// How many of the decision timeframes agree with the dominant direction
    pub aligned_timeframes: u8,
}

impl Default for AlignmentMetrics {
    fn default() -> Self {
        Self {
            alignment_score: 0.5,
            aligned_timeframes: 0,
        }
    }
}

/// Volume / order-flow metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeMetrics {
    /// 0.0 = volume confirms price, 1.0 = full divergence against the move
    pub volume_divergence: f64,

    /// Order book imbalance, -1.0 (sell pressure) to +1.0 (buy pressure)
    pub order_flow_imbalance: f64,

    /// Traded volume at current price vs recent average
    pub volume_at_price_ratio: f64,
}

impl Default for VolumeMetrics {
    fn default() -> Self {
        Self {
            volume_divergence: 0.0,
            order_flow_imbalance: 0.0,
            volume_at_price_ratio: 1.0,
        }
    }
}

/// Market structure context around the current price
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureMetrics {
    /// Nearest support level below price (0.0 = unknown)
    pub nearest_support: f64,

    /// Nearest resistance level above price (0.0 = unknown)
    pub nearest_resistance: f64,

    /// Structure break direction, -1.0 (broke down) to +1.0 (broke up)
    pub structure_break: f64,

    /// Distance to the next structural level in ATR units (0.0 = unknown)
    pub distance_to_structure_atr: f64,
}

/// ML ensemble prediction, reduced to direction + confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlPrediction {
    pub direction: MlDirection,

    /// 0-100
    pub confidence: f64,
}

impl Default for MlPrediction {
    fn default() -> Self {
        Self {
            direction: MlDirection::Hold,
            confidence: 50.0,
        }
    }
}

/// Account and prop-firm risk context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountInfo {
    pub balance: f64,

    /// Today's realized + unrealized PnL in account currency
    pub daily_pnl: f64,

    /// Current drawdown from equity peak, account currency, >= 0
    pub total_drawdown: f64,

    /// Daily loss ceiling in account currency
    pub max_daily_loss: f64,

    /// Total drawdown ceiling in account currency
    pub max_total_drawdown: f64,

    /// Units per lot (default: 100_000, standard FX lot)
    pub contract_size: f64,
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self {
            balance: 0.0,
            daily_pnl: 0.0,
            total_drawdown: 0.0,
            max_daily_loss: 0.0,
            max_total_drawdown: 0.0,
            contract_size: 100_000.0,
        }
    }
}

/// Upcoming news event timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsInfo {
    /// Minutes until the next high-impact event (default: far away)
    pub minutes_until_next_event: f64,

    /// Set when an event is inside the blackout window
    pub high_impact_imminent: bool,
}

impl Default for NewsInfo {
    fn default() -> Self {
        Self {
            minutes_until_next_event: 10_000.0,
            high_impact_imminent: false,
        }
    }
}

/// Coarse cross-asset regime scores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeInfo {
    /// -1.0 = hard risk-off, +1.0 = hard risk-on
    pub risk_appetite: f64,

    /// -1.0 = dollar weak, +1.0 = dollar strong
    pub dollar_strength: f64,
}

/// Per-trade cost model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Spread in price units
    pub spread: f64,

    /// Commission per lot round trip, account currency
    pub commission_per_lot: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            spread: 0.0,
            commission_per_lot: 0.0,
        }
    }
}

/// Complete engine input for one (symbol, tick)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub position: PositionInfo,
    pub timeframes: TimeframeSet,
    pub alignment: AlignmentMetrics,
    pub volume: VolumeMetrics,
    pub structure: StructureMetrics,
    pub ml: MlPrediction,
    pub account: AccountInfo,
    pub news: NewsInfo,
    pub regime: RegimeInfo,
    pub costs: CostModel,

    /// Evaluation time, unix seconds UTC. Stamped by the caller so the
    /// weekend/session rules stay deterministic under test.
    pub timestamp: i64,
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            current_price: 0.0,
            position: PositionInfo::default(),
            timeframes: TimeframeSet::default(),
            alignment: AlignmentMetrics::default(),
            volume: VolumeMetrics::default(),
            structure: StructureMetrics::default(),
            ml: MlPrediction::default(),
            account: AccountInfo::default(),
            news: NewsInfo::default(),
            regime: RegimeInfo::default(),
            costs: CostModel::default(),
            timestamp: 0,
        }
    }
}

impl MarketSnapshot {
    /// +1.0 long, -1.0 short
    pub fn direction(&self) -> f64 {
        self.position.side.direction()
    }

    /// Position notional as a multiple of account equity
    pub fn size_ratio(&self) -> f64 {
        if self.account.balance <= 0.0 {
            return 0.0;
        }
        (self.position.volume * self.account.contract_size * self.current_price)
            / self.account.balance
    }

    /// Convert a favorable price distance into % of account equity
    pub fn price_move_to_account_pct(&self, price_delta: f64) -> f64 {
        if self.account.balance <= 0.0 {
            return 0.0;
        }
        price_delta * self.position.volume * self.account.contract_size / self.account.balance
            * 100.0
    }

    /// Unrealized profit as % of account equity, swap included
    pub fn profit_pct(&self) -> f64 {
        if self.account.balance <= 0.0 || self.position.entry_price <= 0.0 {
            return 0.0;
        }
        let favorable_move =
            (self.current_price - self.position.entry_price) * self.direction();
        let pnl = favorable_move * self.position.volume * self.account.contract_size
            + self.position.swap;
        pnl / self.account.balance * 100.0
    }

    /// How strongly one timeframe's trend supports the position, 0-1
    pub fn tf_support(&self, tf: Timeframe) -> f64 {
        let trend = self.timeframes.get(tf).trend;
        match self.position.side {
            Side::Long => trend,
            Side::Short => 1.0 - trend,
        }
    }

    /// Mean HTF opposition to the position, 0-1
    pub fn htf_opposition(&self) -> f64 {
        let sum: f64 = Timeframe::HTF
            .iter()
            .map(|&tf| 1.0 - self.tf_support(tf))
            .sum();
        sum / Timeframe::HTF.len() as f64
    }

    /// True when every HTF trend field is exactly zero - the upstream
    /// missing-data signal. The engine must HOLD without computing EVs.
    pub fn htf_data_missing(&self) -> bool {
        Timeframe::HTF
            .iter()
            .all(|&tf| self.timeframes.get(tf).trend == 0.0)
    }

    /// ML disagreement with the position, 0-1, confidence weighted
    pub fn ml_disagreement(&self) -> f64 {
        let opposes = match (self.ml.direction, self.position.side) {
            (MlDirection::Sell, Side::Long) | (MlDirection::Buy, Side::Short) => true,
            _ => false,
        };
        if opposes {
            (self.ml.confidence / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// True when the ML call matches the position direction
    pub fn ml_agrees(&self) -> bool {
        matches!(
            (self.ml.direction, self.position.side),
            (MlDirection::Buy, Side::Long) | (MlDirection::Sell, Side::Short)
        )
    }

    pub fn eval_time(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }

    /// Friday from 15:00 UTC counts as pre-weekend gap-risk territory
    pub fn is_friday_afternoon(&self) -> bool {
        let t = self.eval_time();
        t.weekday() == chrono::Weekday::Fri && t.hour() >= 15
    }

    /// Round-trip trading cost as % of account equity
    pub fn trading_cost_pct(&self) -> f64 {
        if self.account.balance <= 0.0 {
            return 0.0;
        }
        let spread_cost =
            self.costs.spread * self.position.volume * self.account.contract_size;
        let commission = self.costs.commission_per_lot * self.position.volume;
        (spread_cost + commission) / self.account.balance * 100.0
    }
}

/// SCALP / DAY / SWING classification. Controls canonical stop timeframes,
/// ATR target multiples, loss ceilings and patience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupType {
    Scalp,
    Day,
    Swing,
}

impl SetupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupType::Scalp => "SCALP",
            SetupType::Day => "DAY",
            SetupType::Swing => "SWING",
        }
    }

    /// Canonical (primary, secondary) timeframes for stop geometry
    pub fn stop_timeframes(&self) -> (Timeframe, Timeframe) {
        match self {
            SetupType::Scalp => (Timeframe::M15, Timeframe::H1),
            SetupType::Day => (Timeframe::H1, Timeframe::H4),
            SetupType::Swing => (Timeframe::H4, Timeframe::D1),
        }
    }

    /// How long this kind of setup is expected to take, in minutes
    pub fn expected_duration_minutes(&self) -> f64 {
        match self {
            SetupType::Scalp => 90.0,
            SetupType::Day => 720.0,
            SetupType::Swing => 4_320.0,
        }
    }

    /// Ceiling on potential_loss, % of account equity
    pub fn loss_cap_pct(&self) -> f64 {
        match self {
            SetupType::Scalp => 0.5,
            SetupType::Day => 1.0,
            SetupType::Swing => 2.0,
        }
    }

    /// ATR multiple used for targets when no structure level is known
    pub fn atr_target_multiple(&self) -> f64 {
        match self {
            SetupType::Scalp => 1.5,
            SetupType::Day => 2.5,
            SetupType::Swing => 4.0,
        }
    }

    /// Classify from take-profit distance in H1-ATR multiples, position age
    /// as the fallback when no TP is set.
    pub fn classify(snapshot: &MarketSnapshot) -> SetupType {
        let h1_atr = snapshot.timeframes.h1.atr;
        let tp = snapshot.position.take_profit;
        if tp > 0.0 && h1_atr > 0.0 {
            let tp_distance = (tp - snapshot.position.entry_price).abs();
            let multiples = tp_distance / h1_atr;
            if multiples <= 2.0 {
                return SetupType::Scalp;
            } else if multiples <= 6.0 {
                return SetupType::Day;
            }
            return SetupType::Swing;
        }
        let age = snapshot.position.age_minutes;
        if age < 120.0 {
            SetupType::Scalp
        } else if age < 1_440.0 {
            SetupType::Day
        } else {
            SetupType::Swing
        }
    }
}
