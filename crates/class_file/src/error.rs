use thiserror::Error;

use crate::constant_pool;

#[derive(Error, Debug)]
pub enum ClassFileError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Expected {0}, found {1:?}")]
    UnexpectedConstantPoolEntry(&'static str, constant_pool::CpInfo),
    #[error("Invalid cp info tag: {0}")]
    InvalidCpInfoTag(u8),
    #[error("Invalid magic identifier: 0x{0:X}")]
    InvalidMagicIdentifier(u32),
    #[error("Constant pool index out of range: {0}")]
    IndexOutOfRange(u16),
    #[error("Attribute with no name entry (name index {0})")]
    MissingAttributeName(u16),
    #[error("Attribute length mismatch in {name}: declared {declared}, actual {actual}")]
    AttributeLengthMismatch {
        name: String,
        declared: u32,
        actual: u64,
    },
    #[error("Stack map frame tag {0} is reserved")]
    ReservedStackMapTag(u8),
    #[error("Unknown verification type tag: {0}")]
    UnknownVerificationTypeTag(u8),
    #[error("Unknown element value tag: {0}")]
    UnknownElementValueTag(u8),
    #[error("Nesting depth limit exceeded")]
    RecursionLimitExceeded,
}
