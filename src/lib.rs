//! hsm-runtime: a hierarchical state machine runtime
//!
//! States nest inside superstates, transitions are guarded and carry ordered
//! actions, and superstates can remember where they were left (shallow or
//! deep history). A machine runs either passively, drained by the host, or
//! actively on its own worker thread.
//!
//! # Core Concepts
//!
//! - **State graph**: states, their hierarchy and transitions ([`graph`])
//! - **Dispatch core**: current state, lifecycle events ([`machine`])
//! - **Execution models**: passive and active machines ([`execution`])
//! - **Scheduling**: delegate queue and timed task scheduler ([`scheduler`])
//! - **Definitions**: table-driven building with validation ([`definition`])
//! - **Checkpoints**: snapshot and restore runtime state ([`checkpoint`])
//!
//! # Example
//!
//! ```rust
//! use hsm_runtime::prelude::*;
//! use hsm_runtime::state_enum;
//!
//! state_enum! {
//!     pub enum Heater {
//!         Off,
//!         On,
//!         Warming,
//!         Holding,
//!     }
//! }
//!
//! let mut heater: PassiveStateMachine<Heater, &str, f32> = PassiveStateMachine::new();
//! let machine = heater.machine_mut();
//! machine
//!     .setup_substates(Heater::On, HistoryType::None, Heater::Warming, &[Heater::Holding])
//!     .unwrap();
//! machine.add_transition(Heater::Off, "power", Heater::On, vec![]);
//! machine.add_transition(Heater::On, "power", Heater::Off, vec![]);
//! machine.add_guarded_transition(
//!     Heater::Warming,
//!     "temperature",
//!     Guard::when(|ctx: &EventContext<Heater, &str, f32>| ctx.args().is_some_and(|t| *t >= 60.0)),
//!     Heater::Holding,
//!     vec![],
//! );
//! heater.initialize(Heater::Off).unwrap();
//!
//! heater.send("power", None).unwrap();
//! heater.send("temperature", Some(45.0)).unwrap();
//! heater.send("temperature", Some(61.5)).unwrap();
//! heater.execute().unwrap();
//!
//! assert_eq!(heater.current_state(), Some(Heater::Holding));
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod definition;
pub mod execution;
pub mod graph;
pub mod machine;
pub mod scheduler;

// Re-export commonly used types
pub use core::{Guard, HistoryType, MachineError, State, StateMachineError};
pub use execution::{ActiveStateMachine, EventSender, PassiveStateMachine};
pub use machine::StateMachine;

/// Everything needed to declare and run a machine.
pub mod prelude {
    pub use crate::core::{
        action, state_handler, Event, EventArgs, EventContext, Guard, HandlerResult,
        HistoryType, MachineError, State, StateMachineError,
    };
    pub use crate::execution::{ActiveStateMachine, EventSender, PassiveStateMachine};
    pub use crate::graph::TransitionResult;
    pub use crate::machine::StateMachine;
}
