use std::fmt;

use crate::{
    annotations::{AnnotationEntry, ElementValue, ParameterAnnotationsEntry},
    stack_map::StackMapFrame,
    AccessFlags, ConstantPool,
};

/// A named, length-prefixed record attached to the class, a member, or
/// nested inside another attribute (e.g. Code). The declared length is kept
/// from decode and re-verified against the bytes actually written on encode.
#[derive(Debug, PartialEq)]
pub struct Attribute {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    pub info: AttributeInfo,
}

#[derive(Debug, PartialEq)]
pub enum AttributeInfo {
    ConstantValue {
        constant_value_index: u16,
    },
    Code(CodeAttribute),
    StackMapTable(Vec<StackMapFrame>),
    Exceptions {
        exception_index_table: Vec<u16>,
    },
    InnerClasses(Vec<InnerClassEntry>),
    EnclosingMethod {
        class_index: u16,
        method_index: u16,
    },
    Synthetic,
    Signature {
        signature_index: u16,
    },
    SourceFile {
        source_file_index: u16,
    },
    SourceDebugExtension {
        debug_extension: Vec<u8>,
    },
    LineNumberTable(Vec<LineNumberTableEntry>),
    LocalVariableTable(Vec<LocalVariableTableEntry>),
    LocalVariableTypeTable(Vec<LocalVariableTypeTableEntry>),
    Deprecated,
    RuntimeVisibleAnnotations(Vec<AnnotationEntry>),
    RuntimeInvisibleAnnotations(Vec<AnnotationEntry>),
    RuntimeVisibleParameterAnnotations(Vec<ParameterAnnotationsEntry>),
    RuntimeInvisibleParameterAnnotations(Vec<ParameterAnnotationsEntry>),
    AnnotationDefault(ElementValue),
    BootstrapMethods(Vec<BootstrapMethodEntry>),
    /// Any attribute name the codec does not know: the payload is carried
    /// verbatim and re-emitted byte for byte.
    Unknown(UnknownAttribute),
}
impl AttributeInfo {
    /// The wire name of a known attribute kind.
    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeInfo::ConstantValue { .. } => "ConstantValue",
            AttributeInfo::Code(_) => "Code",
            AttributeInfo::StackMapTable(_) => "StackMapTable",
            AttributeInfo::Exceptions { .. } => "Exceptions",
            AttributeInfo::InnerClasses(_) => "InnerClasses",
            AttributeInfo::EnclosingMethod { .. } => "EnclosingMethod",
            AttributeInfo::Synthetic => "Synthetic",
            AttributeInfo::Signature { .. } => "Signature",
            AttributeInfo::SourceFile { .. } => "SourceFile",
            AttributeInfo::SourceDebugExtension { .. } => "SourceDebugExtension",
            AttributeInfo::LineNumberTable(_) => "LineNumberTable",
            AttributeInfo::LocalVariableTable(_) => "LocalVariableTable",
            AttributeInfo::LocalVariableTypeTable(_) => "LocalVariableTypeTable",
            AttributeInfo::Deprecated => "Deprecated",
            AttributeInfo::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            AttributeInfo::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            AttributeInfo::RuntimeVisibleParameterAnnotations(_) => {
                "RuntimeVisibleParameterAnnotations"
            }
            AttributeInfo::RuntimeInvisibleParameterAnnotations(_) => {
                "RuntimeInvisibleParameterAnnotations"
            }
            AttributeInfo::AnnotationDefault(_) => "AnnotationDefault",
            AttributeInfo::BootstrapMethods(_) => "BootstrapMethods",
            AttributeInfo::Unknown(_) => return None,
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct Attributes(pub Vec<Attribute>);
impl Attributes {
    pub fn find_by_name(&self, name: &str, constant_pool: &ConstantPool) -> Option<&Attribute> {
        for a in &self.0 {
            let Ok(bytes) = constant_pool.utf8(a.attribute_name_index) else {
                continue;
            };

            if bytes == name.as_bytes() {
                return Some(a);
            }
        }

        None
    }

    pub fn code_attribute(&self) -> Option<&CodeAttribute> {
        self.0.iter().find_map(|a| match a.info {
            AttributeInfo::Code(ref code) => Some(code),
            _ => None,
        })
    }
}

#[derive(PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Attributes,
}
impl fmt::Debug for CodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeAttribute")
            .field("max_stack", &self.max_stack)
            .field("max_locals", &self.max_locals)
            .field("code", &format!("({} bytes)", self.code.len()))
            .field("exception_table", &self.exception_table)
            .field("attributes", &self.attributes)
            .finish()
    }
}

#[derive(PartialEq)]
pub struct UnknownAttribute {
    pub info: Vec<u8>,
}
impl fmt::Debug for UnknownAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnknownAttribute")
            .field("info", &format!("({} bytes)", self.info.len()))
            .finish()
    }
}

#[derive(Debug, PartialEq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    // 0 means the handler catches everything (a finally clause).
    pub catch_type: u16,
}

#[derive(Debug, PartialEq)]
pub struct InnerClassEntry {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    // 0 for anonymous classes.
    pub inner_class_name_index: u16,
    pub inner_class_access_flags: u16,
}
impl InnerClassEntry {
    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.inner_class_access_flags)
    }
}

#[derive(Debug, PartialEq)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, PartialEq)]
pub struct LocalVariableTableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, PartialEq)]
pub struct LocalVariableTypeTableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub signature_index: u16,
    pub index: u16,
}

#[derive(Debug, PartialEq)]
pub struct BootstrapMethodEntry {
    pub bootstrap_method_ref_index: u16,
    pub bootstrap_argument_indexes: Vec<u16>,
}
