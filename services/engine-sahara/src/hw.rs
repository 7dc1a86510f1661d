/// Register-level access to the accelerator.
///
/// Implementations are shared between the submit path, the interrupt handler and
/// the deferred worker, so every method takes `&self`. Register access is
/// expected to be a single volatile load/store; callers serialize through the
/// engine lock where ordering matters.
pub trait Hardware: Send + Sync {
    /// Raw status register.
    fn read_status(&self) -> u32;
    /// Current content of the accept register; zero when it can take a new chain.
    fn read_accept(&self) -> u32;
    /// Hands the physical address of a descriptor chain to the hardware.
    fn write_accept(&self, address: u32);
    /// Raw error-status register. The read clears it.
    fn read_error_status(&self) -> u32;
    fn read_op_status(&self) -> u32;
    /// Address of the descriptor the hardware was working on when it stopped.
    fn read_fault_address(&self) -> u32;
    /// Address of the chain the hardware believes it is executing.
    fn read_in_progress_address(&self) -> u32;
    /// Acknowledges the current interrupt and clears the done/error condition.
    fn clear_interrupt(&self);
    /// Full reset of the engine, discarding whatever it holds.
    fn reset_hardware(&self);
    fn enable_clock(&self);
    fn disable_clock(&self);
    /// Called after the hardware has written a chain's buffers, before anyone
    /// reads them.
    fn invalidate_after_dma(&self, _address: u32) {}
}
