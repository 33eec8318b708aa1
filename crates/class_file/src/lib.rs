// https://docs.oracle.com/javase/specs/jvms/se19/html/jvms-4.html

mod access_flags;
pub mod annotations;
pub mod attributes;
mod class_file;
#[macro_use]
pub mod constant_pool;
mod error;
mod parser;
pub mod stack_map;
mod writer;

pub use self::class_file::{ClassFile, FieldInfo, MethodInfo};
pub use access_flags::AccessFlags;
pub use constant_pool::{Constant, ConstantPool, CpInfo};
pub use error::ClassFileError;
pub use parser::{ConstantRegistry, CustomConstantDecoder, Parser, MAX_NESTING_DEPTH};
pub use writer::Writer;

pub type Result<T, E = ClassFileError> = std::result::Result<T, E>;

/// The four bytes every class file starts with.
pub const MAGIC: u32 = 0xCAFE_BABE;
