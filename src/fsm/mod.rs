//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌───────────┬───────────┬──────────┬───────────────────┐    │
//! │  │ StateId   │ on_enter  │ on_exit  │ on_update         │    │
//! │  ├───────────┼───────────┼──────────┼───────────────────┤    │
//! │  │ Init      │ fn(ctx)   │ -        │ fn(ctx)->Option<> │    │
//! │  │ Joining   │ fn(ctx)   │ -        │ fn(ctx)->Option<> │    │
//! │  │ Connected │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │    │
//! │  │ Fatal     │ fn(ctx)   │ -        │ fn(ctx)->Option<> │    │
//! │  └───────────┴───────────┴──────────┴───────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer. The engine is generic over the context type so the
//! node table and the unit tests below can each bring their own.

pub mod context;
pub mod states;

use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Node lifecycle states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Init = 0,
    Joining = 1,
    Connected = 2,
    Fatal = 3,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 4;

    /// Convert an index back to `StateId`. Out-of-range indices map to
    /// `Fatal` (and assert in debug builds).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Init,
            1 => Self::Joining,
            2 => Self::Connected,
            3 => Self::Fatal,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Fatal
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn<C> = fn(&mut C);

/// Per-tick update handler. Returns `Some(next)` to trigger a transition.
pub type StateUpdateFn<C> = fn(&mut C) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
pub struct StateDescriptor<C> {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn<C>>,
    pub on_exit: Option<StateActionFn<C>>,
    pub on_update: StateUpdateFn<C>,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm<C> {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor<C>; StateId::COUNT],
    current: usize,
}

impl<C> Fsm<C> {
    pub fn new(table: [StateDescriptor<C>; StateId::COUNT], initial: StateId) -> Self {
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
    pub fn start(&mut self, ctx: &mut C) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut C) {
        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut C) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
