//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StateTable                                                 │
//! │  ┌────────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ StateId    │ on_enter  │ on_exit  │ on_update         │  │
//! │  ├────────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Feeding    │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Evaluating │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Stable     │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Safe       │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └────────────┴───────────┴──────────┴───────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and stamps the entry time
//! from `ctx.now_us`.  Dwell checks in the handlers compare against that
//! stamp, so the cadence follows wall time rather than tick count.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;
use serde::Serialize;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all control states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum StateId {
    Feeding = 0,
    Evaluating = 1,
    Stable = 2,
    Safe = 3,
}

impl StateId {
    /// Total number of states, sizes the table array.
    pub const COUNT: usize = 4;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Safe` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Feeding,
            1 => Self::Evaluating,
            2 => Self::Stable,
            3 => Self::Safe,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Safe
            }
        }
    }

    /// The state that follows `self` in the normal cycle.
    pub fn successor(self) -> Self {
        match self {
            Self::Feeding => Self::Evaluating,
            Self::Evaluating => Self::Stable,
            Self::Stable => Self::Feeding,
            Self::Safe => Self::Safe,
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entered_us = ctx.now_us;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick at `ctx.now_us`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (SAFE entry from the monitor, SAFE
    /// exit on reset).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        ctx.state_entered_us = ctx.now_us;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
