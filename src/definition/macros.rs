//! Macros for declaring state types with minimal boilerplate.

/// Declare a fieldless enum and implement [`State`](crate::core::State) for it.
///
/// The enum derives `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Debug` and
/// serde's `Serialize`/`Deserialize`; each variant's name is its identifier.
///
/// # Example
///
/// ```
/// use hsm_runtime::core::State;
/// use hsm_runtime::state_enum;
///
/// state_enum! {
///     pub enum Elevator {
///         Idle,
///         MovingUp,
///         MovingDown,
///     }
/// }
///
/// assert_eq!(Elevator::MovingUp.name(), "MovingUp");
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }
    };
}
