//! Task and trusted-helper collaborator interfaces.
//!
//! The task/stack/context-switch primitive lives outside this core; the
//! loader is a one-shot initializer of it, never an owner. Likewise the
//! always-resident helper windows (`code2`/`tls`) are provided by the
//! firmware image, borrowed by every applet, and outlive all of them.

use crate::memory::{MemoryWindow, PhysAddr};

/// The stack/context primitive backing one applet task.
pub trait TaskContext {
    /// Initialize the task's stack and register context.
    ///
    /// `static_base` is the per-image pointer position-independent code
    /// loads its data addresses through.
    fn init(&mut self, stack: MemoryWindow, static_base: PhysAddr) -> bool;

    /// Arrange for `window` to be swapped in/out with this task.
    fn enable_shared_state(&mut self, window: MemoryWindow);

    /// Push the initial call frame: resuming the task invokes `entry`
    /// with the three arguments.
    fn push_initial_call(&mut self, entry: PhysAddr, arg0: u32, arg1: u32, arg2: u32) -> bool;
}

/// Provider of the always-resident trusted helper windows.
///
/// Every applet gets read access to the same helper code (the syscall
/// trampoline) and a per-task view of its shared state.
pub trait HelperWindows {
    /// Shared helper code window (`code2`).
    fn code_window(&self) -> MemoryWindow;

    /// Shared helper state window (`tls`).
    fn shared_state_window(&self) -> MemoryWindow;

    /// Address of the capability-getter function the applet's entrypoint
    /// receives as its first argument. This is how an applet obtains its
    /// permitted host callbacks without a general syscall table.
    fn capability_getter(&self) -> u32;
}
