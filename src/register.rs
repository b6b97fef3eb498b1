bitflags::bitflags! {
    /// The command word of the configuration header.
    ///
    /// BAR sizing clears [`IO_ENABLE`](CommandRegister::IO_ENABLE) and
    /// [`MEMORY_ENABLE`](CommandRegister::MEMORY_ENABLE) while a register
    /// holds the all-ones probe pattern, so the device cannot transiently
    /// claim a garbage address.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandRegister: u16 {
        const IO_ENABLE = 1 << 0;
        const MEMORY_ENABLE = 1 << 1;
        const BUS_MASTER_ENABLE = 1 << 2;
        const SPECIAL_CYCLE_ENABLE = 1 << 3;
        const MEMORY_WRITE_AND_INVALIDATE = 1 << 4;
        const VGA_PALETTE_SNOOP = 1 << 5;
        const PARITY_ERROR_RESPONSE = 1 << 6;
        const IDSEL_STEP_WAIT_CYCLE_CONTROL = 1 << 7;
        const SERR_ENABLE = 1 << 8;
        const FAST_BACK_TO_BACK_ENABLE = 1 << 9;
        const INTERRUPT_DISABLE = 1 << 10;
        const _ = !0;
    }
}

impl CommandRegister {
    /// The bits cleared while a BAR is being sized.
    pub const DECODE_MASK: CommandRegister =
        CommandRegister::IO_ENABLE.union(CommandRegister::MEMORY_ENABLE);
}
