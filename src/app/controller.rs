//! Node controller: the hexagonal core.
//!
//! [`NodeController`] owns the FSM and the context it drives. All I/O
//! flows through the ports bundled in [`Peripherals`], so the whole
//! lifecycle runs against mock adapters on the host.
//!
//! ```text
//!  SensorPort ──▶ ┌────────────────────────────┐ ──▶ EventSink
//!   RadioPort ◀──▶│       NodeController       │
//!  ConfigPort ◀──▶│  FSM · FaultPolicy · Timer │ ──▶ SystemPort
//!                 └────────────────────────────┘
//! ```

use log::info;

use super::events::NodeEvent;
use super::ports::Platform;
use crate::config::NodeConfig;
use crate::events::RadioEvents;
use crate::fault::RestartReason;
use crate::fsm::context::{NodeContext, NodeState, Peripherals};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};

pub struct NodeController<P: Platform> {
    fsm: Fsm<NodeContext<P>>,
    ctx: NodeContext<P>,
    started: bool,
}

impl<P: Platform> NodeController<P> {
    /// Build the controller. Nothing touches the hardware until [`start`].
    ///
    /// [`start`]: NodeController::start
    pub fn new(hw: Peripherals<P>, events: &'static RadioEvents) -> Self {
        Self {
            fsm: Fsm::new(build_state_table::<P>(), StateId::Init),
            ctx: NodeContext::new(hw, events),
            started: false,
        }
    }

    /// Run `Init`: load configuration, arm the watchdog, start the sensors
    /// and the LoRa stack.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.fsm.start(&mut self.ctx);
    }

    /// One loop iteration. Blocks for at most one settle or poll delay,
    /// or for a whole measurement cycle when the timer is due.
    pub fn tick(&mut self) -> StateId {
        self.start();
        let before = self.fsm.current_state();
        self.fsm.tick(&mut self.ctx);
        let after = self.fsm.current_state();
        if after != before {
            self.ctx.emit(NodeEvent::StateChanged {
                from: before,
                to: after,
            });
        }
        after
    }

    /// Drive the node until it decides to restart.
    ///
    /// On the device the platform restart never returns, so this only
    /// comes back in simulation and tests.
    pub fn run(&mut self) -> RestartReason {
        while self.tick() != StateId::Fatal {}
        let reason = self.ctx.restart.unwrap_or(RestartReason::Unhandled);
        info!("controller stopped: {}", reason);
        reason
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn node_state(&self) -> &NodeState {
        &self.ctx.state
    }

    pub fn config(&self) -> &NodeConfig {
        &self.ctx.config
    }

    /// The restart decision, once one has been made.
    pub fn restart_reason(&self) -> Option<RestartReason> {
        self.ctx.restart
    }

    pub fn peripherals(&self) -> &Peripherals<P> {
        &self.ctx.hw
    }

    pub fn peripherals_mut(&mut self) -> &mut Peripherals<P> {
        &mut self.ctx.hw
    }

    /// Tear down, handing the adapters back (the simulation reuses the
    /// store across restarts).
    pub fn into_peripherals(self) -> Peripherals<P> {
        self.ctx.hw
    }
}
