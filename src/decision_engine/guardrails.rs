//! 🛡️ Anti-Churn Guard
//!
//! Hysteresis between evaluations: one ActionState per symbol remembering
//! the last non-HOLD action, when it fired and what the continuation
//! estimate looked like. A repeat action needs spacing, and a repeat exit
//! additionally needs the continuation estimate to have actually moved,
//! so the engine cannot saw a position to pieces on model noise. Selector
//! overrides bypass the guard; they exist precisely for the states where
//! waiting is the expensive choice.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, info};

use crate::config::GuardConfig;
use crate::decision_engine::ev::Action;

/// Per-symbol hysteresis state
#[derive(Debug, Clone)]
pub struct ActionState {
    pub last_action: Action,
    pub last_action_unix: u64,
    pub last_continuation: f64,
}

/// Statistics snapshot
#[derive(Debug, Clone)]
pub struct GuardStats {
    pub tracked_symbols: usize,
    pub actions_recorded: u64,
    pub blocked_spacing: u64,
    pub blocked_hysteresis: u64,
}

/// Anti-churn guard over all managed symbols
pub struct AntiChurnGuard {
    config: GuardConfig,
    states: Mutex<HashMap<String, ActionState>>,
    actions_recorded: Mutex<u64>,
    blocked_spacing: Mutex<u64>,
    blocked_hysteresis: Mutex<u64>,
}

impl AntiChurnGuard {
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    pub fn with_config(config: GuardConfig) -> Self {
        info!(
            "🛡️ Anti-churn guard: {}s spacing, {:.2} continuation hysteresis",
            config.min_action_spacing_secs, config.continuation_hysteresis
        );
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            actions_recorded: Mutex::new(0),
            blocked_spacing: Mutex::new(0),
            blocked_hysteresis: Mutex::new(0),
        }
    }

    /// Check whether a non-HOLD action may fire now.
    ///
    /// Returns Ok(()) if allowed, Err(reason) if blocked. HOLD and
    /// override-backed actions always pass.
    pub fn check_allowed(
        &self,
        symbol: &str,
        action: Action,
        continuation: f64,
        now: u64,
        override_active: bool,
    ) -> Result<(), String> {
        if action == Action::Hold {
            return Ok(());
        }
        if override_active {
            return Ok(());
        }

        let states = self.states.lock().unwrap();
        if let Some(state) = states.get(symbol) {
            let elapsed = now.saturating_sub(state.last_action_unix);
            if elapsed < self.config.min_action_spacing_secs {
                *self.blocked_spacing.lock().unwrap() += 1;
                return Err(format!(
                    "{}s since last action, {}s required",
                    elapsed, self.config.min_action_spacing_secs
                ));
            }
            if action.is_exit() && state.last_action.is_exit() {
                let moved = (continuation - state.last_continuation).abs();
                if moved < self.config.continuation_hysteresis {
                    *self.blocked_hysteresis.lock().unwrap() += 1;
                    return Err(format!(
                        "continuation moved {:.3}, {:.3} required for a repeat exit",
                        moved, self.config.continuation_hysteresis
                    ));
                }
            }
        }
        Ok(())
    }

    /// Record a fired non-HOLD action (call after check_allowed passes)
    pub fn record_action(&self, symbol: &str, action: Action, continuation: f64, now: u64) {
        if action == Action::Hold {
            return;
        }
        self.states.lock().unwrap().insert(
            symbol.to_string(),
            ActionState {
                last_action: action,
                last_action_unix: now,
                last_continuation: continuation,
            },
        );
        *self.actions_recorded.lock().unwrap() += 1;
        debug!(
            "🛡️ {} recorded {} at {} (cont {:.2})",
            symbol,
            action.as_str(),
            now,
            continuation
        );
    }

    /// Drop the state when the position closes
    pub fn clear(&self, symbol: &str) {
        if self.states.lock().unwrap().remove(symbol).is_some() {
            debug!("🛡️ {} action state cleared", symbol);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<ActionState> {
        self.states.lock().unwrap().get(symbol).cloned()
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            tracked_symbols: self.states.lock().unwrap().len(),
            actions_recorded: *self.actions_recorded.lock().unwrap(),
            blocked_spacing: *self.blocked_spacing.lock().unwrap(),
            blocked_hysteresis: *self.blocked_hysteresis.lock().unwrap(),
        }
    }
}

impl Default for AntiChurnGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_always_allowed() {
        let guard = AntiChurnGuard::new();
        guard.record_action("EURUSD", Action::Close, 0.4, 1000);
        assert!(guard
            .check_allowed("EURUSD", Action::Hold, 0.4, 1001, false)
            .is_ok());
    }

    #[test]
    fn test_spacing_blocks_rapid_repeat() {
        let guard = AntiChurnGuard::new();
        guard.record_action("EURUSD", Action::ScaleOut25, 0.5, 1000);

        let blocked = guard.check_allowed("EURUSD", Action::ScaleOut25, 0.3, 1100, false);
        assert!(blocked.is_err());

        // Other symbols are unaffected
        assert!(guard
            .check_allowed("GBPUSD", Action::Close, 0.3, 1100, false)
            .is_ok());

        // After the window the action is allowed again
        assert!(guard
            .check_allowed("EURUSD", Action::ScaleOut25, 0.3, 1400, false)
            .is_ok());
    }

    #[test]
    fn test_hysteresis_needs_the_estimate_to_move() {
        let guard = AntiChurnGuard::new();
        guard.record_action("EURUSD", Action::ScaleOut50, 0.50, 1000);

        // Spacing satisfied but continuation barely moved
        let blocked = guard.check_allowed("EURUSD", Action::Close, 0.52, 1400, false);
        assert!(blocked.is_err());

        // A real shift unblocks
        assert!(guard
            .check_allowed("EURUSD", Action::Close, 0.40, 1400, false)
            .is_ok());
    }

    #[test]
    fn test_hysteresis_only_applies_to_repeat_exits() {
        let guard = AntiChurnGuard::new();
        guard.record_action("EURUSD", Action::ScaleIn, 0.70, 1000);
        // Exit after an add is judged on spacing alone
        assert!(guard
            .check_allowed("EURUSD", Action::Close, 0.69, 1400, false)
            .is_ok());
    }

    #[test]
    fn test_override_bypasses_everything() {
        let guard = AntiChurnGuard::new();
        guard.record_action("EURUSD", Action::Close, 0.5, 1000);
        assert!(guard
            .check_allowed("EURUSD", Action::Close, 0.5, 1001, true)
            .is_ok());
    }

    #[test]
    fn test_clear_and_stats() {
        let guard = AntiChurnGuard::new();
        guard.record_action("EURUSD", Action::ScaleOut25, 0.5, 1000);
        guard.record_action("GBPUSD", Action::Close, 0.4, 1000);

        let _ = guard.check_allowed("EURUSD", Action::Close, 0.5, 1010, false);
        let stats = guard.stats();
        assert_eq!(stats.tracked_symbols, 2);
        assert_eq!(stats.actions_recorded, 2);
        assert_eq!(stats.blocked_spacing, 1);

        guard.clear("EURUSD");
        assert!(guard.get("EURUSD").is_none());
        assert_eq!(guard.stats().tracked_symbols, 1);
    }
}
