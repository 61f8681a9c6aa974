pub mod command;
pub mod intent;
pub mod machine;
pub mod replies;
pub mod slots;
pub mod state;

pub use command::Command;
pub use intent::{Intent, IntentResult};
pub use machine::SessionSnapshot;
pub use slots::{Slot, SlotCompletion};
pub use state::PlanningState;
