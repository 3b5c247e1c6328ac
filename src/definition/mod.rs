//! Table-driven machine definitions.
//!
//! A definition is two lists of rows: states with their place in the
//! hierarchy, and transitions whose guards and actions are referenced by
//! name. Validation uses Stillwater's `Validation` to report every problem
//! in one pass instead of stopping at the first.
//!
//! ```rust
//! use hsm_runtime::definition::{HandlerRegistry, MachineDefinition, TransitionRow};
//! use hsm_runtime::state_enum;
//! use stillwater::validation::Validation;
//!
//! state_enum! {
//!     pub enum Job { Queued, Running }
//! }
//!
//! let definition: MachineDefinition<Job, &str> = MachineDefinition::new()
//!     .transition(TransitionRow::new(Job::Queued, "run").guard("has_worker").target(Job::Running))
//!     .transition(TransitionRow::new(Job::Running, "done").action("notify"));
//!
//! let registry: HandlerRegistry<Job, &str, ()> = HandlerRegistry::new();
//! match definition.validate(&registry) {
//!     Validation::Failure(errors) => assert_eq!(errors.len(), 2),
//!     Validation::Success(_) => unreachable!(),
//! }
//! ```

pub mod error;
pub mod machine;
pub mod macros;
pub mod registry;
pub mod rows;

pub use error::{BuildError, DefinitionViolation};
pub use machine::MachineDefinition;
pub use registry::HandlerRegistry;
pub use rows::{StateRow, TransitionRow};
