use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use log::{debug, trace};

use crate::{
    annotations::{AnnotationEntry, ElementValue, ParameterAnnotationsEntry},
    attributes::{Attribute, AttributeInfo, Attributes, CodeAttribute},
    class_file::{FieldInfo, MethodInfo},
    constant_pool::{Constant, ConstantPool, CpInfo},
    parser::MAX_NESTING_DEPTH,
    stack_map::{StackMapFrame, VerificationTypeInfo},
    ClassFile, ClassFileError, Result,
};

type Endian = BigEndian;

/// Encodes a class file graph back into bytes. Every `write_*` method emits
/// the exact fields its `parse_*` counterpart reads, in the same order; a
/// freshly decoded graph therefore writes back its original bytes.
pub struct Writer<W> {
    w: W,
    pos: u64,
    depth: usize,
    max_depth: usize,
}
impl<W: Write> Writer<W> {
    pub fn new(w: W) -> Self {
        Self {
            w,
            pos: 0,
            depth: 0,
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Overrides the nesting depth budget.
    pub fn nesting_limit(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn write_class_file(&mut self, class_file: &ClassFile) -> Result<()> {
        self.write_u32(class_file.magic)?;
        self.write_u16(class_file.minor_version)?;
        self.write_u16(class_file.major_version)?;

        self.write_constant_pool(&class_file.constant_pool)?;

        debug!("Access Flags : {:#06X}", class_file.access_flags);
        self.write_u16(class_file.access_flags)?;
        self.write_u16(class_file.this_class)?;
        self.write_u16(class_file.super_class)?;

        debug!("Interfaces Count : {}", class_file.interfaces.len());
        self.write_u16(class_file.interfaces.len() as u16)?;
        for &index in &class_file.interfaces {
            self.write_u16(index)?;
        }

        debug!("Fields Count : {}", class_file.fields.len());
        self.write_u16(class_file.fields.len() as u16)?;
        for field in &class_file.fields {
            self.write_field_info(&class_file.constant_pool, field)?;
        }

        debug!("Methods Count : {}", class_file.methods.len());
        self.write_u16(class_file.methods.len() as u16)?;
        for method in &class_file.methods {
            self.write_method_info(&class_file.constant_pool, method)?;
        }

        self.write_attributes(&class_file.constant_pool, &class_file.attributes)?;

        Ok(())
    }

    fn write_constant_pool(&mut self, constant_pool: &ConstantPool) -> Result<()> {
        let constant_pool_count = constant_pool.count();
        debug!("Constant Pool Count : {}", constant_pool_count);
        self.write_u16(constant_pool_count)?;

        // The null slot and the slot after every Long/Double write no bytes.
        for constant in constant_pool.iter() {
            self.write_constant(constant)?;
        }

        Ok(())
    }

    fn write_constant(&mut self, constant: &Constant) -> Result<()> {
        trace!("Constant {} : tag {}", constant.index, constant.info.tag());
        self.write_u8(constant.info.tag())?;

        match constant.info {
            CpInfo::Utf8(ref bytes) => {
                self.write_u16(bytes.len() as u16)?;
                self.write_bytes(bytes)?;
            }
            CpInfo::Integer(int) => self.write_i32(int)?,
            CpInfo::Float(bits) => self.write_u32(bits)?,
            CpInfo::Long(ref num) | CpInfo::Double(ref num) => {
                self.write_u32(num.high_bytes)?;
                self.write_u32(num.low_bytes)?;
            }
            CpInfo::Class(ref info) => self.write_u16(info.name_index)?,
            CpInfo::String { string_index } => self.write_u16(string_index)?,
            CpInfo::FieldRef(ref info)
            | CpInfo::MethodRef(ref info)
            | CpInfo::InterfaceMethodRef(ref info) => {
                self.write_u16(info.class_index)?;
                self.write_u16(info.name_and_type_index)?;
            }
            CpInfo::NameAndType(ref info) => {
                self.write_u16(info.name_index)?;
                self.write_u16(info.descriptor_index)?;
            }
            CpInfo::MethodHandle(ref info) => {
                self.write_u8(info.reference_kind)?;
                self.write_u16(info.reference_index)?;
            }
            CpInfo::MethodType(ref info) => self.write_u16(info.descriptor_index)?,
            CpInfo::InvokeDynamic(ref info) => {
                self.write_u16(info.bootstrap_method_attr_index)?;
                self.write_u16(info.name_and_type_index)?;
            }
            CpInfo::Custom(ref custom) => self.write_bytes(&custom.bytes)?,
        }

        Ok(())
    }

    fn write_field_info(&mut self, constant_pool: &ConstantPool, field: &FieldInfo) -> Result<()> {
        self.write_u16(field.access_flags)?;
        self.write_u16(field.name_index)?;
        self.write_u16(field.descriptor_index)?;
        self.write_attributes(constant_pool, &field.attributes)?;

        Ok(())
    }

    fn write_method_info(
        &mut self,
        constant_pool: &ConstantPool,
        method: &MethodInfo,
    ) -> Result<()> {
        self.write_u16(method.access_flags)?;
        self.write_u16(method.name_index)?;
        self.write_u16(method.descriptor_index)?;
        self.write_attributes(constant_pool, &method.attributes)?;

        Ok(())
    }

    fn write_attributes(
        &mut self,
        constant_pool: &ConstantPool,
        attributes: &Attributes,
    ) -> Result<()> {
        self.write_u16(attributes.0.len() as u16)?;
        for attribute in &attributes.0 {
            self.write_attribute(constant_pool, attribute)?;
        }

        Ok(())
    }

    fn write_attribute(
        &mut self,
        constant_pool: &ConstantPool,
        attribute: &Attribute,
    ) -> Result<()> {
        if self.depth == self.max_depth {
            return Err(ClassFileError::RecursionLimitExceeded);
        }
        self.depth += 1;
        let result = self.write_attribute_body(constant_pool, attribute);
        self.depth -= 1;
        result
    }

    fn write_attribute_body(
        &mut self,
        constant_pool: &ConstantPool,
        attribute: &Attribute,
    ) -> Result<()> {
        debug!(
            "Encoding Attribute type : {}",
            attribute_name(constant_pool, attribute)
        );

        self.write_u16(attribute.attribute_name_index)?;
        self.write_u32(attribute.attribute_length)?;
        let start = self.pos;

        match attribute.info {
            AttributeInfo::ConstantValue {
                constant_value_index,
            } => self.write_u16(constant_value_index)?,
            AttributeInfo::Code(ref code) => self.write_code_attribute(constant_pool, code)?,
            AttributeInfo::StackMapTable(ref entries) => {
                self.write_u16(entries.len() as u16)?;
                for frame in entries {
                    self.write_stack_map_frame(frame)?;
                }
            }
            AttributeInfo::Exceptions {
                ref exception_index_table,
            } => {
                self.write_u16(exception_index_table.len() as u16)?;
                for &index in exception_index_table {
                    self.write_u16(index)?;
                }
            }
            AttributeInfo::InnerClasses(ref classes) => {
                self.write_u16(classes.len() as u16)?;
                for entry in classes {
                    self.write_u16(entry.inner_class_info_index)?;
                    self.write_u16(entry.outer_class_info_index)?;
                    self.write_u16(entry.inner_class_name_index)?;
                    self.write_u16(entry.inner_class_access_flags)?;
                }
            }
            AttributeInfo::EnclosingMethod {
                class_index,
                method_index,
            } => {
                self.write_u16(class_index)?;
                self.write_u16(method_index)?;
            }
            AttributeInfo::Synthetic | AttributeInfo::Deprecated => {}
            AttributeInfo::Signature { signature_index } => self.write_u16(signature_index)?,
            AttributeInfo::SourceFile { source_file_index } => {
                self.write_u16(source_file_index)?
            }
            AttributeInfo::SourceDebugExtension {
                ref debug_extension,
            } => self.write_bytes(debug_extension)?,
            AttributeInfo::LineNumberTable(ref line_number_table) => {
                self.write_u16(line_number_table.len() as u16)?;
                for entry in line_number_table {
                    self.write_u16(entry.start_pc)?;
                    self.write_u16(entry.line_number)?;
                }
            }
            AttributeInfo::LocalVariableTable(ref local_variable_table) => {
                self.write_u16(local_variable_table.len() as u16)?;
                for entry in local_variable_table {
                    self.write_u16(entry.start_pc)?;
                    self.write_u16(entry.length)?;
                    self.write_u16(entry.name_index)?;
                    self.write_u16(entry.descriptor_index)?;
                    self.write_u16(entry.index)?;
                }
            }
            AttributeInfo::LocalVariableTypeTable(ref local_variable_type_table) => {
                self.write_u16(local_variable_type_table.len() as u16)?;
                for entry in local_variable_type_table {
                    self.write_u16(entry.start_pc)?;
                    self.write_u16(entry.length)?;
                    self.write_u16(entry.name_index)?;
                    self.write_u16(entry.signature_index)?;
                    self.write_u16(entry.index)?;
                }
            }
            AttributeInfo::RuntimeVisibleAnnotations(ref annotations)
            | AttributeInfo::RuntimeInvisibleAnnotations(ref annotations) => {
                self.write_annotations(annotations)?
            }
            AttributeInfo::RuntimeVisibleParameterAnnotations(ref parameter_annotations)
            | AttributeInfo::RuntimeInvisibleParameterAnnotations(ref parameter_annotations) => {
                self.write_parameter_annotations(parameter_annotations)?
            }
            AttributeInfo::AnnotationDefault(ref default_value) => {
                self.write_element_value(default_value)?
            }
            AttributeInfo::BootstrapMethods(ref bootstrap_methods) => {
                self.write_u16(bootstrap_methods.len() as u16)?;
                for entry in bootstrap_methods {
                    self.write_u16(entry.bootstrap_method_ref_index)?;
                    self.write_u16(entry.bootstrap_argument_indexes.len() as u16)?;
                    for &index in &entry.bootstrap_argument_indexes {
                        self.write_u16(index)?;
                    }
                }
            }
            AttributeInfo::Unknown(ref unknown) => self.write_bytes(&unknown.info)?,
        }

        // Same self-check as decode, opposite direction.
        let actual = self.pos - start;
        if actual != attribute.attribute_length as u64 {
            return Err(ClassFileError::AttributeLengthMismatch {
                name: attribute_name(constant_pool, attribute),
                declared: attribute.attribute_length,
                actual,
            });
        }

        Ok(())
    }

    fn write_code_attribute(
        &mut self,
        constant_pool: &ConstantPool,
        code: &CodeAttribute,
    ) -> Result<()> {
        self.write_u16(code.max_stack)?;
        self.write_u16(code.max_locals)?;

        self.write_u32(code.code.len() as u32)?;
        self.write_bytes(&code.code)?;

        self.write_u16(code.exception_table.len() as u16)?;
        for entry in &code.exception_table {
            self.write_u16(entry.start_pc)?;
            self.write_u16(entry.end_pc)?;
            self.write_u16(entry.handler_pc)?;
            self.write_u16(entry.catch_type)?;
        }

        self.write_attributes(constant_pool, &code.attributes)?;

        Ok(())
    }

    fn write_stack_map_frame(&mut self, frame: &StackMapFrame) -> Result<()> {
        trace!("Encoding Stack Frame type : {}", frame.tag());

        match *frame {
            StackMapFrame::Same { tag } => {
                debug_assert!(tag <= 63);
                self.write_u8(tag)?;
            }
            StackMapFrame::SameLocals1StackItem { tag, ref stack } => {
                debug_assert!((64..=127).contains(&tag));
                self.write_u8(tag)?;
                self.write_verification_type_info(stack)?;
            }
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta,
                ref stack,
            } => {
                self.write_u8(247)?;
                self.write_u16(offset_delta)?;
                self.write_verification_type_info(stack)?;
            }
            StackMapFrame::Chop { tag, offset_delta } => {
                debug_assert!((248..=250).contains(&tag));
                self.write_u8(tag)?;
                self.write_u16(offset_delta)?;
            }
            StackMapFrame::SameExtended { offset_delta } => {
                self.write_u8(251)?;
                self.write_u16(offset_delta)?;
            }
            StackMapFrame::Append {
                tag,
                offset_delta,
                ref locals,
            } => {
                debug_assert!((252..=254).contains(&tag));
                debug_assert_eq!((tag - 251) as usize, locals.len());
                self.write_u8(tag)?;
                self.write_u16(offset_delta)?;
                for local in locals {
                    self.write_verification_type_info(local)?;
                }
            }
            StackMapFrame::Full {
                offset_delta,
                ref locals,
                ref stack,
            } => {
                self.write_u8(255)?;
                self.write_u16(offset_delta)?;

                self.write_u16(locals.len() as u16)?;
                for local in locals {
                    self.write_verification_type_info(local)?;
                }

                self.write_u16(stack.len() as u16)?;
                for item in stack {
                    self.write_verification_type_info(item)?;
                }
            }
        }

        Ok(())
    }

    fn write_verification_type_info(&mut self, info: &VerificationTypeInfo) -> Result<()> {
        self.write_u8(info.tag())?;

        match *info {
            VerificationTypeInfo::Object { cpool_index } => self.write_u16(cpool_index)?,
            VerificationTypeInfo::Uninitialized { offset } => self.write_u16(offset)?,
            _ => {}
        }

        Ok(())
    }

    fn write_annotations(&mut self, annotations: &[AnnotationEntry]) -> Result<()> {
        self.write_u16(annotations.len() as u16)?;
        for entry in annotations {
            self.write_annotation_entry(entry)?;
        }

        Ok(())
    }

    fn write_annotation_entry(&mut self, entry: &AnnotationEntry) -> Result<()> {
        self.write_u16(entry.type_index)?;

        self.write_u16(entry.element_value_pairs.len() as u16)?;
        for pair in &entry.element_value_pairs {
            self.write_u16(pair.element_name_index)?;
            self.write_element_value(&pair.value)?;
        }

        Ok(())
    }

    fn write_parameter_annotations(
        &mut self,
        parameter_annotations: &[ParameterAnnotationsEntry],
    ) -> Result<()> {
        // A one-byte count, unlike every other annotation table.
        self.write_u8(parameter_annotations.len() as u8)?;
        for entry in parameter_annotations {
            self.write_annotations(&entry.annotations)?;
        }

        Ok(())
    }

    fn write_element_value(&mut self, value: &ElementValue) -> Result<()> {
        if self.depth == self.max_depth {
            return Err(ClassFileError::RecursionLimitExceeded);
        }
        self.depth += 1;
        let result = self.write_element_value_body(value);
        self.depth -= 1;
        result
    }

    fn write_element_value_body(&mut self, value: &ElementValue) -> Result<()> {
        self.write_u8(value.tag())?;

        match *value {
            ElementValue::Constant {
                constant_value_index,
                ..
            } => self.write_u16(constant_value_index)?,
            ElementValue::EnumConstant {
                type_name_index,
                const_name_index,
            } => {
                self.write_u16(type_name_index)?;
                self.write_u16(const_name_index)?;
            }
            ElementValue::Class { class_info_index } => self.write_u16(class_info_index)?,
            ElementValue::Annotation(ref entry) => self.write_annotation_entry(entry)?,
            ElementValue::Array(ref values) => {
                self.write_u16(values.len() as u16)?;
                for value in values {
                    self.write_element_value(value)?;
                }
            }
        }

        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.w.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn write_u32(&mut self, dword: u32) -> Result<()> {
        self.w.write_u32::<Endian>(dword)?;
        self.pos += 4;
        Ok(())
    }

    fn write_u16(&mut self, word: u16) -> Result<()> {
        self.w.write_u16::<Endian>(word)?;
        self.pos += 2;
        Ok(())
    }

    fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.w.write_u8(byte)?;
        self.pos += 1;
        Ok(())
    }

    fn write_i32(&mut self, int: i32) -> Result<()> {
        self.w.write_i32::<Endian>(int)?;
        self.pos += 4;
        Ok(())
    }
}

fn attribute_name(constant_pool: &ConstantPool, attribute: &Attribute) -> String {
    match attribute.info.name() {
        Some(name) => name.to_owned(),
        None => constant_pool
            .utf8(attribute.attribute_name_index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_owned()),
    }
}


#[cfg(test)]
mod write_attribute_tests {
    use super::*;
    use crate::attributes::UnknownAttribute;
    use crate::constant_pool::Constant;

    fn pool() -> ConstantPool {
        ConstantPool::new(vec![
            None,
            Some(Constant {
                index: 1,
                info: CpInfo::Utf8(b"SourceFile".to_vec()),
            }),
        ])
    }

    #[test]
    fn it_should_write_name_length_and_body() {
        let attribute = Attribute {
            attribute_name_index: 1,
            attribute_length: 2,
            info: AttributeInfo::SourceFile {
                source_file_index: 2,
            },
        };

        let mut out = Vec::new();
        Writer::new(&mut out)
            .write_attribute(&pool(), &attribute)
            .unwrap();

        assert_eq!(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02], out);
    }

    #[test]
    fn it_should_fail_when_the_declared_length_disagrees_with_the_body() {
        let attribute = Attribute {
            attribute_name_index: 1,
            attribute_length: 3,
            info: AttributeInfo::SourceFile {
                source_file_index: 2,
            },
        };

        let mut out = Vec::new();
        assert!(matches!(
            Writer::new(&mut out).write_attribute(&pool(), &attribute),
            Err(ClassFileError::AttributeLengthMismatch {
                declared: 3,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn it_should_write_an_unknown_attribute_byte_for_byte() {
        let attribute = Attribute {
            attribute_name_index: 1,
            attribute_length: 4,
            info: AttributeInfo::Unknown(UnknownAttribute {
                info: vec![0xde, 0xad, 0xbe, 0xef],
            }),
        };

        let mut out = Vec::new();
        Writer::new(&mut out)
            .write_attribute(&pool(), &attribute)
            .unwrap();

        assert_eq!(
            vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef],
            out
        );
    }

    #[test]
    fn it_should_write_an_empty_body_for_marker_attributes() {
        let attribute = Attribute {
            attribute_name_index: 1,
            attribute_length: 0,
            info: AttributeInfo::Deprecated,
        };

        let mut out = Vec::new();
        Writer::new(&mut out)
            .write_attribute(&pool(), &attribute)
            .unwrap();

        assert_eq!(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00], out);
    }
}

#[cfg(test)]
mod write_stack_map_frame_tests {
    use super::*;

    fn written(frame: StackMapFrame) -> Vec<u8> {
        let mut out = Vec::new();
        Writer::new(&mut out).write_stack_map_frame(&frame).unwrap();
        out
    }

    #[test]
    fn it_should_write_a_same_frame_as_its_bare_tag() {
        assert_eq!(vec![63], written(StackMapFrame::Same { tag: 63 }));
    }

    #[test]
    fn it_should_write_an_append_frame_with_its_stored_tag() {
        let out = written(StackMapFrame::Append {
            tag: 253,
            offset_delta: 1,
            locals: vec![VerificationTypeInfo::Integer, VerificationTypeInfo::Float],
        });
        assert_eq!(vec![253, 0x00, 0x01, 1, 2], out);
    }

    #[test]
    fn it_should_write_a_full_frame_with_both_counted_lists() {
        let out = written(StackMapFrame::Full {
            offset_delta: 2,
            locals: vec![VerificationTypeInfo::Long],
            stack: vec![VerificationTypeInfo::Uninitialized { offset: 5 }],
        });
        assert_eq!(
            vec![255, 0x00, 0x02, 0x00, 0x01, 4, 0x00, 0x01, 8, 0x00, 0x05],
            out
        );
    }

    #[test]
    fn it_should_write_an_object_verification_type_with_its_pool_index() {
        let mut out = Vec::new();
        Writer::new(&mut out)
            .write_verification_type_info(&VerificationTypeInfo::Object { cpool_index: 7 })
            .unwrap();
        assert_eq!(vec![7, 0x00, 0x07], out);
    }
}
