use thiserror::Error;

/// Bridge error types covering configuration, fieldbus plane, and egress failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Plug request addressed a slot beyond the module rack.
    #[error("slot {slot} out of range (max {max})")]
    SlotOutOfRange {
        /// Requested slot index.
        slot: u16,
        /// Highest valid slot index.
        max: u16,
    },

    /// Module/submodule ident pair is not in the supported catalog.
    #[error("module 0x{module_ident:08x} submodule 0x{submodule_ident:08x} not in catalog")]
    UnknownModule {
        /// Module ident number from the controller.
        module_ident: u32,
        /// Submodule ident number from the controller.
        submodule_ident: u32,
    },

    /// Fieldbus provider operation failed.
    #[error("fieldbus error: {0}")]
    Fieldbus(String),

    /// Egress sink setup or send error.
    #[error("egress error: {0}")]
    Egress(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Convenience type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
