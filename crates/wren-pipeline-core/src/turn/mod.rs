//! One user turn: classification, the reasoning-stream state machine, and
//! the runtime that carries out its effects.

pub mod classify;
pub mod effect;
pub mod oneshot;
pub mod reduce;
pub mod runtime;
pub mod state;

pub use classify::{Input, classify, is_chart_command, is_synthetic_prompt};
pub use effect::Effect;
pub use oneshot::answer_once;
pub use reduce::{NextStep, next_step, reduce};
pub use runtime::{FragmentStream, TurnRuntime, TurnSettings};
pub use state::{TurnPhase, TurnState};
