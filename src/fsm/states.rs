//! Concrete state handler functions and table builder.
//!
//! Each state is three plain `fn` pointers over [`FsmContext`]. Transitions
//! between the three working states are purely time-triggered; SAFE is
//! only ever entered or left through `Fsm::force_transition`.
//!
//! ```text
//!  FEEDING ──[t_feed]──▶ EVALUATING ──[t_eval]──▶ STABLE
//!     ▲                                              │
//!     └────────────────────[t_stable]────────────────┘
//!
//!  Any state ══[anomaly / stop]══▶ SAFE ══[reset]══▶ FEEDING
//! ```

use super::context::FsmContext;
use super::{StateDescriptor, StateId};
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Called once per engine instance.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Feeding
        StateDescriptor {
            id: StateId::Feeding,
            name: "Feeding",
            on_enter: Some(feeding_enter),
            on_exit: None,
            on_update: feeding_update,
        },
        // Index 1: Evaluating
        StateDescriptor {
            id: StateId::Evaluating,
            name: "Evaluating",
            on_enter: Some(evaluating_enter),
            on_exit: Some(evaluating_exit),
            on_update: evaluating_update,
        },
        // Index 2: Stable
        StateDescriptor {
            id: StateId::Stable,
            name: "Stable",
            on_enter: Some(stable_enter),
            on_exit: None,
            on_update: stable_update,
        },
        // Index 3: Safe
        StateDescriptor {
            id: StateId::Safe,
            name: "Safe",
            on_enter: Some(safe_enter),
            on_exit: Some(safe_exit),
            on_update: safe_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  FEEDING: one pulse, then wait for the fish to react
// ═══════════════════════════════════════════════════════════════════════════

fn feeding_enter(ctx: &mut FsmContext) {
    ctx.commands.feed_pulse = true;
    info!(
        "FEEDING: pulse requested at {:.1}%, dwell {:.1}s",
        ctx.commands.pwm, ctx.timing.feed_secs
    );
}

fn feeding_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.secs_in_state() >= ctx.timing.feed_secs {
        return Some(StateId::Evaluating);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  EVALUATING: sample H for the controller
// ═══════════════════════════════════════════════════════════════════════════

fn evaluating_enter(ctx: &mut FsmContext) {
    ctx.window.clear();
    if let Some(h) = ctx.sample.take() {
        ctx.window.push(ctx.now_us, h);
    }
}

fn evaluating_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(h) = ctx.sample.take() {
        ctx.window.push(ctx.now_us, h);
    }
    if ctx.secs_in_state() >= ctx.timing.eval_secs {
        return Some(StateId::Stable);
    }
    None
}

fn evaluating_exit(ctx: &mut FsmContext) {
    let samples = ctx.window.samples();
    ctx.commands.h_eval = ctx.window.close(ctx.now_us);
    match ctx.commands.h_eval {
        Some(h) => info!("EVALUATING: H_eval={h:.3} over {samples} samples"),
        None => warn!("EVALUATING: no samples in window, controller skipped this cycle"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STABLE: settle with the PWM unchanged
// ═══════════════════════════════════════════════════════════════════════════

fn stable_enter(ctx: &mut FsmContext) {
    info!(
        "STABLE: holding {:.1}% for {:.1}s",
        ctx.commands.pwm, ctx.timing.stable_secs
    );
}

fn stable_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.sample = None;
    if ctx.secs_in_state() >= ctx.timing.stable_secs {
        ctx.cycles_completed += 1;
        return Some(StateId::Feeding);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAFE: baseline duty until an explicit reset
// ═══════════════════════════════════════════════════════════════════════════

fn safe_enter(ctx: &mut FsmContext) {
    ctx.commands.pwm = ctx.pwm_baseline;
    ctx.commands.feed_pulse = false;
    ctx.commands.h_eval = None;
    ctx.sample = None;
    ctx.window.clear();
    warn!("SAFE: duty forced to baseline {:.1}%", ctx.pwm_baseline);
}

fn safe_exit(ctx: &mut FsmContext) {
    info!("SAFE: reset accepted, resuming feed cycle");
    ctx.window.clear();
}

fn safe_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.sample = None;
    None
}
