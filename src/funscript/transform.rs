// src/funscript/transform.rs

//! Deterministic rewrites applied to a script before it is uploaded.
//!
//! Both modes keep every non-`actions` field of the script as it was and never
//! reorder actions.

use super::script::{Action, Script};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Compress every position into the lower half of the range.
    Halve,
    /// Zero the stroke and insert a full-height hit between each pair of actions.
    Double,
}

/// Returns a new script with `mode` applied to its actions.
pub fn transform(script: &Script, mode: TransformMode) -> Script {
    let actions = match mode {
        TransformMode::Halve => halve_actions(&script.actions),
        TransformMode::Double => double_actions(&script.actions),
    };
    Script {
        actions,
        extra: script.extra.clone(),
    }
}

/// Maps every position to `clamp(pos, 0, 100) / 2`.
pub fn halve_actions(actions: &[Action]) -> Vec<Action> {
    actions
        .iter()
        .map(|a| Action {
            at: a.at,
            pos: a.pos.clamp(0, 100) / 2,
        })
        .collect()
}

/// For `N` input actions this produces `2N - 1` actions:
/// - every original action drops to position 0, except position 95 which snaps to 100;
/// - a synthetic action at position 100 sits at the floored midpoint of each adjacent pair.
pub fn double_actions(actions: &[Action]) -> Vec<Action> {
    let mut doubled = Vec::with_capacity(actions.len().saturating_mul(2));

    for (i, action) in actions.iter().enumerate() {
        let pos = if action.pos == 95 { 100 } else { 0 };
        doubled.push(Action { at: action.at, pos });

        if let Some(next) = actions.get(i + 1) {
            let midpoint = floor_midpoint(action.at, next.at);
            doubled.push(Action { at: midpoint, pos: 100 });
        }
    }

    doubled
}

/// `floor((a + b) / 2)` without overflowing on large timestamps.
fn floor_midpoint(a: u64, b: u64) -> u64 {
    a / 2 + b / 2 + (a % 2 + b % 2) / 2
}
