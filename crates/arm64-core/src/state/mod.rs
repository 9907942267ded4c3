//! Guest architectural state.

/// Execution context handed to translated code.
pub mod context;
/// Register file, operands, condition codes and system registers.
pub mod registers;
/// Guest thread lifecycle states.
pub mod run_state;

pub use context::{ExclusiveMonitor, ExecutionContext, SupervisorCallHandler};
pub use registers::{
    Condition, GeneralRegister, Nzcv, RegisterFile, RegisterOperand, SystemRegister,
    GENERAL_REGISTER_COUNT,
};
pub use run_state::RunState;
