use std::{
    collections::HashMap,
    io::{BufReader, Read},
};

use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, trace};

use crate::{
    annotations::{AnnotationEntry, ElementValue, ElementValuePair, ParameterAnnotationsEntry},
    attributes::{
        Attribute, AttributeInfo, Attributes, BootstrapMethodEntry, CodeAttribute,
        ExceptionTableEntry, InnerClassEntry, LineNumberTableEntry, LocalVariableTableEntry,
        LocalVariableTypeTableEntry, UnknownAttribute,
    },
    class_file::{FieldInfo, MethodInfo},
    constant_pool::{
        ClassInfo, Constant, ConstantPool, CpInfo, CustomInfo, InvokeDynamicInfo,
        MethodHandleInfo, MethodTypeInfo, NameAndTypeInfo, Num64Info, RefInfo,
    },
    stack_map::{StackMapFrame, VerificationTypeInfo},
    ClassFile, ClassFileError, Result, MAGIC,
};

type Endian = BigEndian;

/// Default budget for attribute-in-attribute and element-value nesting. The
/// wire format itself puts no bound on either, so the parser has to.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Decode strategy for a nonstandard constant pool tag. The strategy must
/// return exactly the payload bytes it consumed from the stream.
pub type CustomConstantDecoder = Box<dyn Fn(&mut dyn Read) -> std::io::Result<Vec<u8>>>;

/// An explicit table of decode strategies for constant tags outside the
/// standard set. Passed into [`Parser::with_registry`]; constants decoded
/// through it become [`CpInfo::Custom`] and re-encode verbatim.
#[derive(Default)]
pub struct ConstantRegistry {
    decoders: HashMap<u8, CustomConstantDecoder>,
}
impl ConstantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        tag: u8,
        decoder: impl Fn(&mut dyn Read) -> std::io::Result<Vec<u8>> + 'static,
    ) {
        self.decoders.insert(tag, Box::new(decoder));
    }

    fn get(&self, tag: u8) -> Option<&CustomConstantDecoder> {
        self.decoders.get(&tag)
    }
}

pub struct Parser<R> {
    r: BufReader<R>,
    registry: ConstantRegistry,
    pos: u64,
    depth: usize,
    max_depth: usize,
}
impl<R: Read> Parser<R> {
    pub fn new(r: R) -> Self {
        Self::with_registry(r, ConstantRegistry::default())
    }

    pub fn with_registry(r: R, registry: ConstantRegistry) -> Self {
        Self {
            r: BufReader::new(r),
            registry,
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

    pub fn parse(&mut self) -> Result<ClassFile> {
        let magic = self.parse_magic_identifier()?;
        let (minor_version, major_version) = self.parse_version()?;
        debug!("Major Version : {}", major_version);
        debug!("Minor Version : {}", minor_version);

        let constant_pool = self.parse_constant_pool()?;

        let access_flags = self.read_u16()?;
        debug!("Access Flags : {:#06X}", access_flags);

        let this_class = self.read_u16()?;
        trace!("This Class : {}", this_class);
        check_constant_index(&constant_pool, this_class)?;

        let super_class = self.read_u16()?;
        trace!("Super Class : {}", super_class);
        check_constant_index(&constant_pool, super_class)?;

        let interfaces_count = self.read_u16()?;
        debug!("Interfaces Count : {}", interfaces_count);
        let interfaces = (0..interfaces_count)
            .map(|_| {
                let index = self.read_u16()?;
                check_constant_index(&constant_pool, index)?;
                Ok(index)
            })
            .collect::<Result<Vec<_>>>()?;

        let fields_count = self.read_u16()?;
        debug!("Fields Count : {}", fields_count);
        let fields = (0..fields_count)
            .map(|_| self.parse_field_info(&constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let methods_count = self.read_u16()?;
        debug!("Methods Count : {}", methods_count);
        let methods = (0..methods_count)
            .map(|_| self.parse_method_info(&constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let attributes_count = self.read_u16()?;
        debug!("Attributes Count : {}", attributes_count);
        let attributes = self.parse_attributes(&constant_pool, attributes_count)?;

        Ok(ClassFile {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn parse_magic_identifier(&mut self) -> Result<u32> {
        match self.read_u32()? {
            MAGIC => Ok(MAGIC),
            magic_identifier => Err(ClassFileError::InvalidMagicIdentifier(magic_identifier)),
        }
    }

    fn parse_version(&mut self) -> Result<(u16, u16)> {
        let minor = self.read_u16()?;
        let major = self.read_u16()?;
        Ok((minor, major))
    }

    fn parse_field_info(&mut self, constant_pool: &ConstantPool) -> Result<FieldInfo> {
        let access_flags = self.read_u16()?;
        let name_index = self.read_u16()?;
        let name = constant_pool.utf8(name_index)?;
        trace!("Member Name : {}", String::from_utf8_lossy(name));
        let descriptor_index = self.read_u16()?;
        constant_pool.utf8(descriptor_index)?;
        let attributes_count = self.read_u16()?;
        let attributes = self.parse_attributes(constant_pool, attributes_count)?;

        Ok(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_method_info(&mut self, constant_pool: &ConstantPool) -> Result<MethodInfo> {
        let access_flags = self.read_u16()?;
        let name_index = self.read_u16()?;
        let name = constant_pool.utf8(name_index)?;
        trace!("Member Name : {}", String::from_utf8_lossy(name));
        let descriptor_index = self.read_u16()?;
        constant_pool.utf8(descriptor_index)?;
        let attributes_count = self.read_u16()?;
        let attributes = self.parse_attributes(constant_pool, attributes_count)?;

        Ok(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_constant_pool(&mut self) -> Result<ConstantPool> {
        let constant_pool_count = self.read_u16()?;
        debug!("Constant Pool Count : {}", constant_pool_count);

        let mut entries = Vec::with_capacity(constant_pool_count as usize);
        // 0 is a null index.
        entries.push(None);

        let mut index = 1u16;
        while index < constant_pool_count {
            let info = self.parse_cp_info()?;
            trace!("Constant {} : tag {}", index, info.tag());
            let is_long = info.is_long();

            entries.push(Some(Constant { index, info }));
            index += 1;

            if is_long {
                // The slot after a Long/Double stays empty.
                entries.push(None);
                index += 1;
            }
        }

        Ok(ConstantPool::new(entries))
    }

    fn parse_cp_info(&mut self) -> Result<CpInfo> {
        let tag = self.read_u8()?;
        match tag {
            1 => self.parse_utf8(),
            3 => self.parse_integer(),
            4 => self.parse_float(),
            5 => self.parse_long(),
            6 => self.parse_double(),
            7 => self.parse_class_info(),
            8 => self.parse_string(),
            9 => self.parse_field_ref(),
            10 => self.parse_method_ref(),
            11 => self.parse_interface_method_ref(),
            12 => self.parse_name_and_type_info(),
            15 => self.parse_method_handle(),
            16 => self.parse_method_type_info(),
            18 => self.parse_invoke_dynamic_info(),
            tag => {
                let Some(decoder) = self.registry.get(tag) else {
                    return Err(ClassFileError::InvalidCpInfoTag(tag));
                };
                let bytes = decoder(&mut self.r)?;
                self.pos += bytes.len() as u64;
                Ok(CpInfo::Custom(CustomInfo { tag, bytes }))
            }
        }
    }

    fn parse_utf8(&mut self) -> Result<CpInfo> {
        let length = self.read_u16()?;
        let bytes = self.read_bytes(length as usize)?;

        Ok(CpInfo::Utf8(bytes))
    }

    fn parse_integer(&mut self) -> Result<CpInfo> {
        let int = self.read_i32()?;

        Ok(CpInfo::Integer(int))
    }

    fn parse_float(&mut self) -> Result<CpInfo> {
        // Kept as the raw bit pattern; f32::from_bits recovers the value.
        let bits = self.read_u32()?;

        Ok(CpInfo::Float(bits))
    }

    fn parse_long(&mut self) -> Result<CpInfo> {
        let high_bytes = self.read_u32()?;
        let low_bytes = self.read_u32()?;

        Ok(CpInfo::Long(Num64Info {
            high_bytes,
            low_bytes,
        }))
    }

    fn parse_double(&mut self) -> Result<CpInfo> {
        let high_bytes = self.read_u32()?;
        let low_bytes = self.read_u32()?;

        Ok(CpInfo::Double(Num64Info {
            high_bytes,
            low_bytes,
        }))
    }

    fn parse_class_info(&mut self) -> Result<CpInfo> {
        let name_index = self.read_u16()?;

        Ok(CpInfo::Class(ClassInfo { name_index }))
    }

    fn parse_string(&mut self) -> Result<CpInfo> {
        let string_index = self.read_u16()?;

        Ok(CpInfo::String { string_index })
    }

    fn parse_field_ref(&mut self) -> Result<CpInfo> {
        let ref_info = self.parse_ref_info()?;

        Ok(CpInfo::FieldRef(ref_info))
    }

    fn parse_method_ref(&mut self) -> Result<CpInfo> {
        let ref_info = self.parse_ref_info()?;

        Ok(CpInfo::MethodRef(ref_info))
    }

    fn parse_interface_method_ref(&mut self) -> Result<CpInfo> {
        let ref_info = self.parse_ref_info()?;

        Ok(CpInfo::InterfaceMethodRef(ref_info))
    }

    fn parse_name_and_type_info(&mut self) -> Result<CpInfo> {
        let name_index = self.read_u16()?;
        let descriptor_index = self.read_u16()?;

        Ok(CpInfo::NameAndType(NameAndTypeInfo {
            name_index,
            descriptor_index,
        }))
    }

    fn parse_method_handle(&mut self) -> Result<CpInfo> {
        let reference_kind = self.read_u8()?;
        let reference_index = self.read_u16()?;

        Ok(CpInfo::MethodHandle(MethodHandleInfo {
            reference_kind,
            reference_index,
        }))
    }

    fn parse_method_type_info(&mut self) -> Result<CpInfo> {
        let descriptor_index = self.read_u16()?;

        Ok(CpInfo::MethodType(MethodTypeInfo { descriptor_index }))
    }

    fn parse_invoke_dynamic_info(&mut self) -> Result<CpInfo> {
        let bootstrap_method_attr_index = self.read_u16()?;
        let name_and_type_index = self.read_u16()?;

        Ok(CpInfo::InvokeDynamic(InvokeDynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        }))
    }

    fn parse_ref_info(&mut self) -> Result<RefInfo> {
        let class_index = self.read_u16()?;
        let name_and_type_index = self.read_u16()?;

        Ok(RefInfo {
            class_index,
            name_and_type_index,
        })
    }

    fn parse_attributes(
        &mut self,
        constant_pool: &ConstantPool,
        attributes_count: u16,
    ) -> Result<Attributes> {
        (0..attributes_count)
            .map(|_| self.parse_attribute(constant_pool))
            .collect::<Result<Vec<_>>>()
            .map(Attributes)
    }

    fn parse_attribute(&mut self, constant_pool: &ConstantPool) -> Result<Attribute> {
        if self.depth == self.max_depth {
            return Err(ClassFileError::RecursionLimitExceeded);
        }
        self.depth += 1;
        let attribute = self.parse_attribute_body(constant_pool);
        self.depth -= 1;
        attribute
    }

    fn parse_attribute_body(&mut self, constant_pool: &ConstantPool) -> Result<Attribute> {
        let attribute_name_index = self.read_u16()?;
        let attribute_length = self.read_u32()?;
        let name = constant_pool
            .utf8(attribute_name_index)
            .map_err(|_| ClassFileError::MissingAttributeName(attribute_name_index))?;
        let start = self.pos;

        debug!("Decoding Attribute type : {}", String::from_utf8_lossy(name));

        let info = match std::str::from_utf8(name).unwrap_or_default() {
            "ConstantValue" => self.parse_constant_value_attribute(constant_pool)?,
            "Code" => self.parse_code_attribute(constant_pool)?,
            "StackMapTable" => self.parse_stack_map_table_attribute(constant_pool)?,
            "Exceptions" => self.parse_exceptions_attribute(constant_pool)?,
            "InnerClasses" => self.parse_inner_classes_attribute(constant_pool)?,
            "EnclosingMethod" => self.parse_enclosing_method_attribute(constant_pool)?,
            "Synthetic" => AttributeInfo::Synthetic,
            "Signature" => self.parse_signature_attribute(constant_pool)?,
            "SourceFile" => self.parse_source_file_attribute(constant_pool)?,
            "SourceDebugExtension" => {
                self.parse_source_debug_extension_attribute(attribute_length)?
            }
            "LineNumberTable" => self.parse_line_number_table_attribute()?,
            "LocalVariableTable" => self.parse_local_variable_table_attribute(constant_pool)?,
            "LocalVariableTypeTable" => {
                self.parse_local_variable_type_table_attribute(constant_pool)?
            }
            "Deprecated" => AttributeInfo::Deprecated,
            "RuntimeVisibleAnnotations" => {
                AttributeInfo::RuntimeVisibleAnnotations(self.parse_annotations(constant_pool)?)
            }
            "RuntimeInvisibleAnnotations" => {
                AttributeInfo::RuntimeInvisibleAnnotations(self.parse_annotations(constant_pool)?)
            }
            "RuntimeVisibleParameterAnnotations" => {
                AttributeInfo::RuntimeVisibleParameterAnnotations(
                    self.parse_parameter_annotations(constant_pool)?,
                )
            }
            "RuntimeInvisibleParameterAnnotations" => {
                AttributeInfo::RuntimeInvisibleParameterAnnotations(
                    self.parse_parameter_annotations(constant_pool)?,
                )
            }
            "AnnotationDefault" => {
                AttributeInfo::AnnotationDefault(self.parse_element_value(constant_pool)?)
            }
            "BootstrapMethods" => self.parse_bootstrap_methods_attribute(constant_pool)?,
            _ => {
                trace!("Unknown Attribute type; Keeping verbatim");
                AttributeInfo::Unknown(UnknownAttribute {
                    info: self.read_bytes(attribute_length as usize)?,
                })
            }
        };

        // The primary structural self-check: a known decoder has to consume
        // exactly the declared byte count.
        let actual = self.pos - start;
        if actual != attribute_length as u64 {
            return Err(ClassFileError::AttributeLengthMismatch {
                name: String::from_utf8_lossy(name).into_owned(),
                declared: attribute_length,
                actual,
            });
        }

        Ok(Attribute {
            attribute_name_index,
            attribute_length,
            info,
        })
    }

    fn parse_constant_value_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let constant_value_index = self.read_u16()?;
        check_constant_index(constant_pool, constant_value_index)?;

        Ok(AttributeInfo::ConstantValue {
            constant_value_index,
        })
    }

    fn parse_code_attribute(&mut self, constant_pool: &ConstantPool) -> Result<AttributeInfo> {
        let max_stack = self.read_u16()?;
        let max_locals = self.read_u16()?;
        let code_length = self.read_u32()?;
        let code = self.read_bytes(code_length as usize)?;

        let exception_table_length = self.read_u16()?;
        let exception_table = (0..exception_table_length)
            .map(|_| self.parse_exception_table_entry())
            .collect::<Result<Vec<_>>>()?;

        let attributes_count = self.read_u16()?;
        let attributes = self.parse_attributes(constant_pool, attributes_count)?;

        Ok(AttributeInfo::Code(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        }))
    }

    fn parse_exception_table_entry(&mut self) -> Result<ExceptionTableEntry> {
        let start_pc = self.read_u16()?;
        let end_pc = self.read_u16()?;
        let handler_pc = self.read_u16()?;
        let catch_type = self.read_u16()?;

        Ok(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }

    fn parse_stack_map_table_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let number_of_entries = self.read_u16()?;
        trace!("Stack Frame count : {}", number_of_entries);
        let entries = (0..number_of_entries)
            .map(|_| self.parse_stack_map_frame(constant_pool))
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::StackMapTable(entries))
    }

    fn parse_stack_map_frame(&mut self, constant_pool: &ConstantPool) -> Result<StackMapFrame> {
        let tag = self.read_u8()?;
        trace!("Decoding Stack Frame type : {}", tag);

        match tag {
            0..=63 => Ok(StackMapFrame::Same { tag }),
            64..=127 => Ok(StackMapFrame::SameLocals1StackItem {
                tag,
                stack: self.parse_verification_type_info(constant_pool)?,
            }),
            128..=246 => Err(ClassFileError::ReservedStackMapTag(tag)),
            247 => Ok(StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: self.read_u16()?,
                stack: self.parse_verification_type_info(constant_pool)?,
            }),
            248..=250 => Ok(StackMapFrame::Chop {
                tag,
                offset_delta: self.read_u16()?,
            }),
            251 => Ok(StackMapFrame::SameExtended {
                offset_delta: self.read_u16()?,
            }),
            252..=254 => {
                let offset_delta = self.read_u16()?;
                // tag - 251 appended locals follow.
                let locals = (0..tag - 251)
                    .map(|_| self.parse_verification_type_info(constant_pool))
                    .collect::<Result<Vec<_>>>()?;

                Ok(StackMapFrame::Append {
                    tag,
                    offset_delta,
                    locals,
                })
            }
            255 => {
                let offset_delta = self.read_u16()?;

                let number_of_locals = self.read_u16()?;
                let locals = (0..number_of_locals)
                    .map(|_| self.parse_verification_type_info(constant_pool))
                    .collect::<Result<Vec<_>>>()?;

                let number_of_stack_items = self.read_u16()?;
                let stack = (0..number_of_stack_items)
                    .map(|_| self.parse_verification_type_info(constant_pool))
                    .collect::<Result<Vec<_>>>()?;

                Ok(StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                })
            }
        }
    }

    fn parse_verification_type_info(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<VerificationTypeInfo> {
        let tag = self.read_u8()?;
        match tag {
            0 => Ok(VerificationTypeInfo::Top),
            1 => Ok(VerificationTypeInfo::Integer),
            2 => Ok(VerificationTypeInfo::Float),
            3 => Ok(VerificationTypeInfo::Double),
            4 => Ok(VerificationTypeInfo::Long),
            5 => Ok(VerificationTypeInfo::Null),
            6 => Ok(VerificationTypeInfo::UninitializedThis),
            7 => {
                let cpool_index = self.read_u16()?;
                check_constant_index(constant_pool, cpool_index)?;
                Ok(VerificationTypeInfo::Object { cpool_index })
            }
            8 => Ok(VerificationTypeInfo::Uninitialized {
                offset: self.read_u16()?,
            }),
            tag => Err(ClassFileError::UnknownVerificationTypeTag(tag)),
        }
    }

    fn parse_exceptions_attribute(&mut self, constant_pool: &ConstantPool) -> Result<AttributeInfo> {
        let number_of_exceptions = self.read_u16()?;
        let exception_index_table = (0..number_of_exceptions)
            .map(|_| {
                let index = self.read_u16()?;
                check_constant_index(constant_pool, index)?;
                Ok(index)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::Exceptions {
            exception_index_table,
        })
    }

    fn parse_inner_classes_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let number_of_classes = self.read_u16()?;
        let classes = (0..number_of_classes)
            .map(|_| self.parse_inner_class_entry(constant_pool))
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::InnerClasses(classes))
    }

    fn parse_inner_class_entry(&mut self, constant_pool: &ConstantPool) -> Result<InnerClassEntry> {
        let inner_class_info_index = self.read_u16()?;
        check_constant_index(constant_pool, inner_class_info_index)?;
        let outer_class_info_index = self.read_u16()?;
        check_constant_index(constant_pool, outer_class_info_index)?;
        // 0 for anonymous classes.
        let inner_class_name_index = self.read_u16()?;
        check_constant_index(constant_pool, inner_class_name_index)?;
        let inner_class_access_flags = self.read_u16()?;

        Ok(InnerClassEntry {
            inner_class_info_index,
            outer_class_info_index,
            inner_class_name_index,
            inner_class_access_flags,
        })
    }

    fn parse_enclosing_method_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let class_index = self.read_u16()?;
        check_constant_index(constant_pool, class_index)?;
        let method_index = self.read_u16()?;
        check_constant_index(constant_pool, method_index)?;

        Ok(AttributeInfo::EnclosingMethod {
            class_index,
            method_index,
        })
    }

    fn parse_signature_attribute(&mut self, constant_pool: &ConstantPool) -> Result<AttributeInfo> {
        let signature_index = self.read_u16()?;
        check_constant_index(constant_pool, signature_index)?;

        Ok(AttributeInfo::Signature { signature_index })
    }

    fn parse_source_file_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let source_file_index = self.read_u16()?;
        check_constant_index(constant_pool, source_file_index)?;

        Ok(AttributeInfo::SourceFile { source_file_index })
    }

    fn parse_source_debug_extension_attribute(
        &mut self,
        attribute_length: u32,
    ) -> Result<AttributeInfo> {
        // The payload is the whole attribute body.
        let debug_extension = self.read_bytes(attribute_length as usize)?;

        Ok(AttributeInfo::SourceDebugExtension { debug_extension })
    }

    fn parse_line_number_table_attribute(&mut self) -> Result<AttributeInfo> {
        let line_number_table_length = self.read_u16()?;
        let line_number_table = (0..line_number_table_length)
            .map(|_| {
                let start_pc = self.read_u16()?;
                let line_number = self.read_u16()?;
                Ok(LineNumberTableEntry {
                    start_pc,
                    line_number,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::LineNumberTable(line_number_table))
    }

    fn parse_local_variable_table_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let local_variable_table_length = self.read_u16()?;
        let local_variable_table = (0..local_variable_table_length)
            .map(|_| {
                let start_pc = self.read_u16()?;
                let length = self.read_u16()?;
                let name_index = self.read_u16()?;
                check_constant_index(constant_pool, name_index)?;
                let descriptor_index = self.read_u16()?;
                check_constant_index(constant_pool, descriptor_index)?;
                let index = self.read_u16()?;

                Ok(LocalVariableTableEntry {
                    start_pc,
                    length,
                    name_index,
                    descriptor_index,
                    index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::LocalVariableTable(local_variable_table))
    }

    fn parse_local_variable_type_table_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let local_variable_type_table_length = self.read_u16()?;
        let local_variable_type_table = (0..local_variable_type_table_length)
            .map(|_| {
                let start_pc = self.read_u16()?;
                let length = self.read_u16()?;
                let name_index = self.read_u16()?;
                check_constant_index(constant_pool, name_index)?;
                let signature_index = self.read_u16()?;
                check_constant_index(constant_pool, signature_index)?;
                let index = self.read_u16()?;

                Ok(LocalVariableTypeTableEntry {
                    start_pc,
                    length,
                    name_index,
                    signature_index,
                    index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::LocalVariableTypeTable(
            local_variable_type_table,
        ))
    }

    fn parse_annotations(&mut self, constant_pool: &ConstantPool) -> Result<Vec<AnnotationEntry>> {
        let num_annotations = self.read_u16()?;
        (0..num_annotations)
            .map(|_| self.parse_annotation_entry(constant_pool))
            .collect()
    }

    fn parse_annotation_entry(&mut self, constant_pool: &ConstantPool) -> Result<AnnotationEntry> {
        let type_index = self.read_u16()?;
        check_constant_index(constant_pool, type_index)?;

        let num_element_value_pairs = self.read_u16()?;
        trace!("Element-Value Pairs count : {}", num_element_value_pairs);
        let element_value_pairs = (0..num_element_value_pairs)
            .map(|_| {
                let element_name_index = self.read_u16()?;
                check_constant_index(constant_pool, element_name_index)?;
                let value = self.parse_element_value(constant_pool)?;

                Ok(ElementValuePair {
                    element_name_index,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AnnotationEntry {
            type_index,
            element_value_pairs,
        })
    }

    fn parse_element_value(&mut self, constant_pool: &ConstantPool) -> Result<ElementValue> {
        if self.depth == self.max_depth {
            return Err(ClassFileError::RecursionLimitExceeded);
        }
        self.depth += 1;
        let value = self.parse_element_value_body(constant_pool);
        self.depth -= 1;
        value
    }

    fn parse_element_value_body(&mut self, constant_pool: &ConstantPool) -> Result<ElementValue> {
        let tag = self.read_u8()?;
        match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
                let constant_value_index = self.read_u16()?;
                check_constant_index(constant_pool, constant_value_index)?;

                Ok(ElementValue::Constant {
                    tag,
                    constant_value_index,
                })
            }
            b'e' => {
                let type_name_index = self.read_u16()?;
                check_constant_index(constant_pool, type_name_index)?;
                let const_name_index = self.read_u16()?;
                check_constant_index(constant_pool, const_name_index)?;

                Ok(ElementValue::EnumConstant {
                    type_name_index,
                    const_name_index,
                })
            }
            b'c' => {
                let class_info_index = self.read_u16()?;
                check_constant_index(constant_pool, class_info_index)?;

                Ok(ElementValue::Class { class_info_index })
            }
            b'@' => Ok(ElementValue::Annotation(Box::new(
                self.parse_annotation_entry(constant_pool)?,
            ))),
            b'[' => {
                let num_values = self.read_u16()?;
                let values = (0..num_values)
                    .map(|_| self.parse_element_value(constant_pool))
                    .collect::<Result<Vec<_>>>()?;

                Ok(ElementValue::Array(values))
            }
            tag => Err(ClassFileError::UnknownElementValueTag(tag)),
        }
    }

    fn parse_parameter_annotations(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<Vec<ParameterAnnotationsEntry>> {
        // A one-byte count, unlike every other annotation table.
        let num_parameters = self.read_u8()?;
        (0..num_parameters)
            .map(|_| {
                let annotations = self.parse_annotations(constant_pool)?;
                Ok(ParameterAnnotationsEntry { annotations })
            })
            .collect()
    }

    fn parse_bootstrap_methods_attribute(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let num_bootstrap_methods = self.read_u16()?;
        let bootstrap_methods = (0..num_bootstrap_methods)
            .map(|_| {
                let bootstrap_method_ref_index = self.read_u16()?;
                check_constant_index(constant_pool, bootstrap_method_ref_index)?;

                let num_bootstrap_arguments = self.read_u16()?;
                let bootstrap_argument_indexes = (0..num_bootstrap_arguments)
                    .map(|_| {
                        let index = self.read_u16()?;
                        check_constant_index(constant_pool, index)?;
                        Ok(index)
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(BootstrapMethodEntry {
                    bootstrap_method_ref_index,
                    bootstrap_argument_indexes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AttributeInfo::BootstrapMethods(bootstrap_methods))
    }

    fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.r.read_exact(&mut bytes)?;
        self.pos += length as u64;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let value = self.r.read_u32::<Endian>()?;
        self.pos += 4;
        Ok(value)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let value = self.r.read_u16::<Endian>()?;
        self.pos += 2;
        Ok(value)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let value = self.r.read_u8()?;
        self.pos += 1;
        Ok(value)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let value = self.r.read_i32::<Endian>()?;
        self.pos += 4;
        Ok(value)
    }
}

/// Bounds check for a constant reference read off the wire. 0 is allowed
/// here; several records use it for an absent reference, and `resolve`
/// refuses it at lookup time.
fn check_constant_index(constant_pool: &ConstantPool, index: u16) -> Result<()> {
    if index != 0 && index >= constant_pool.count() {
        return Err(ClassFileError::IndexOutOfRange(index));
    }
    Ok(())
}

#[cfg(test)]
fn test_pool(infos: Vec<CpInfo>) -> ConstantPool {
    let mut entries = vec![None];
    for info in infos {
        let is_long = info.is_long();
        entries.push(Some(Constant {
            index: entries.len() as u16,
            info,
        }));
        if is_long {
            entries.push(None);
        }
    }
    ConstantPool::new(entries)
}

#[cfg(test)]
mod parse_magic_identifier_tests {
    use super::*;

    #[test]
    fn it_should_be_able_to_parse_the_correct_identifier() {
        assert!(Parser::new(&[0xca, 0xfe, 0xba, 0xbe][..])
            .parse_magic_identifier()
            .is_ok());
    }

    #[test]
    fn it_should_fail_if_there_is_not_enough_data() {
        assert!(Parser::new(&[0xca, 0xfe, 0xba][..])
            .parse_magic_identifier()
            .is_err());
    }

    #[test]
    fn it_should_fail_if_the_magic_identifier_is_incorrect() {
        assert!(matches!(
            Parser::new(&[0xca, 0xfe, 0xba, 0xbf][..]).parse_magic_identifier(),
            Err(ClassFileError::InvalidMagicIdentifier(0xCAFEBABF))
        ));
    }
}

#[cfg(test)]
mod parse_version_tests {
    use super::*;

    #[test]
    fn it_should_parse_minor_before_major() {
        assert_eq!(
            Parser::new(&[0x00, 0x03, 0x00, 0x37][..])
                .parse_version()
                .unwrap(),
            (3, 55)
        );
    }
}



#[cfg(test)]
mod parse_element_value_tests {
    use super::*;

    fn pool() -> ConstantPool {
        test_pool(vec![
            CpInfo::Integer(7),
            CpInfo::Utf8(b"LState;".to_vec()),
        ])
    }

    #[test]
    fn it_should_parse_a_constant_value_and_keep_its_tag() {
        let value = Parser::new(&[b'I', 0x00, 0x01][..])
            .parse_element_value(&pool())
            .unwrap();

        assert_eq!(
            ElementValue::Constant {
                tag: b'I',
                constant_value_index: 1,
            },
            value
        );
    }

    #[test]
    fn it_should_parse_an_enum_constant_value() {
        let value = Parser::new(&[b'e', 0x00, 0x02, 0x00, 0x02][..])
            .parse_element_value(&pool())
            .unwrap();

        assert_eq!(
            ElementValue::EnumConstant {
                type_name_index: 2,
                const_name_index: 2,
            },
            value
        );
    }

    #[test]
    fn it_should_parse_an_array_of_three_constants_in_order() {
        let bytes = [
            b'[', 0x00, 0x03, // three entries
            b'I', 0x00, 0x01, b'I', 0x00, 0x01, b'I', 0x00, 0x01,
        ];
        let value = Parser::new(&bytes[..]).parse_element_value(&pool()).unwrap();

        match value {
            ElementValue::Array(values) => {
                assert_eq!(3, values.len());
                for value in values {
                    assert_eq!(
                        ElementValue::Constant {
                            tag: b'I',
                            constant_value_index: 1,
                        },
                        value
                    );
                }
            }
            value => panic!("unexpected element value: {:?}", value),
        }
    }

    #[test]
    fn it_should_fail_on_an_unknown_tag() {
        assert!(matches!(
            Parser::new(&[b'X', 0x00, 0x01][..]).parse_element_value(&pool()),
            Err(ClassFileError::UnknownElementValueTag(b'X'))
        ));
    }

    #[test]
    fn it_should_stop_at_the_nesting_depth_budget() {
        // One more nested array than the budget allows.
        let mut bytes = Vec::new();
        for _ in 0..MAX_NESTING_DEPTH {
            bytes.extend_from_slice(&[b'[', 0x00, 0x01]);
        }
        bytes.extend_from_slice(&[b'I', 0x00, 0x01]);

        assert!(matches!(
            Parser::new(&bytes[..]).parse_element_value(&pool()),
            Err(ClassFileError::RecursionLimitExceeded)
        ));
    }

    #[test]
    fn it_should_parse_nesting_within_the_depth_budget() {
        let mut bytes = Vec::new();
        for _ in 0..MAX_NESTING_DEPTH - 1 {
            bytes.extend_from_slice(&[b'[', 0x00, 0x01]);
        }
        bytes.extend_from_slice(&[b'I', 0x00, 0x01]);

        assert!(Parser::new(&bytes[..]).parse_element_value(&pool()).is_ok());
    }
}

#[cfg(test)]
mod parse_attribute_tests {
    use super::*;

    fn pool() -> ConstantPool {
        test_pool(vec![
            CpInfo::Utf8(b"SourceFile".to_vec()),
            CpInfo::Utf8(b"Test.java".to_vec()),
            CpInfo::Utf8(b"org.example.Custom".to_vec()),
        ])
    }

    #[test]
    fn it_should_parse_a_source_file_attribute() {
        let bytes = [
            0x00, 0x01, // name -> "SourceFile"
            0x00, 0x00, 0x00, 0x02, // length
            0x00, 0x02, // -> "Test.java"
        ];
        let attribute = Parser::new(&bytes[..]).parse_attribute(&pool()).unwrap();

        assert_eq!(1, attribute.attribute_name_index);
        assert_eq!(2, attribute.attribute_length);
        assert_eq!(
            AttributeInfo::SourceFile {
                source_file_index: 2,
            },
            attribute.info
        );
    }

    #[test]
    fn it_should_keep_an_unknown_attribute_verbatim() {
        let bytes = [
            0x00, 0x03, // name -> "org.example.Custom"
            0x00, 0x00, 0x00, 0x04, // length
            0xde, 0xad, 0xbe, 0xef,
        ];
        let attribute = Parser::new(&bytes[..]).parse_attribute(&pool()).unwrap();

        assert_eq!(
            AttributeInfo::Unknown(UnknownAttribute {
                info: vec![0xde, 0xad, 0xbe, 0xef],
            }),
            attribute.info
        );
    }

    #[test]
    fn it_should_fail_when_the_declared_length_is_too_short() {
        let bytes = [
            0x00, 0x01, // name -> "SourceFile"
            0x00, 0x00, 0x00, 0x01, // declared one byte short
            0x00, 0x02,
        ];
        assert!(matches!(
            Parser::new(&bytes[..]).parse_attribute(&pool()),
            Err(ClassFileError::AttributeLengthMismatch {
                declared: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn it_should_fail_when_the_declared_length_is_too_long() {
        let bytes = [
            0x00, 0x01, // name -> "SourceFile"
            0x00, 0x00, 0x00, 0x03, // declared one byte past the body
            0x00, 0x02, 0x00,
        ];
        assert!(matches!(
            Parser::new(&bytes[..]).parse_attribute(&pool()),
            Err(ClassFileError::AttributeLengthMismatch {
                declared: 3,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn it_should_fail_when_the_name_index_is_null() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            Parser::new(&bytes[..]).parse_attribute(&pool()),
            Err(ClassFileError::MissingAttributeName(0))
        ));
    }
}
