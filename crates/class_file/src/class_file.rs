use std::borrow::Cow;
use std::io::{Read, Write};

use crate::{
    attributes::Attributes, constant_pool::ClassInfo, matches_cp_info, parser::Parser,
    writer::Writer, AccessFlags, ConstantPool, ConstantRegistry, Result,
};

#[derive(Debug)]
pub struct ClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Attributes,
}
impl ClassFile {
    pub fn parse(bytes: impl Read) -> Result<ClassFile> {
        Parser::new(bytes).parse()
    }

    /// Like [`ClassFile::parse`], with a registry of decode strategies for
    /// nonstandard constant pool tags.
    pub fn parse_with(bytes: impl Read, registry: ConstantRegistry) -> Result<ClassFile> {
        Parser::with_registry(bytes, registry).parse()
    }

    /// Re-encodes the class file. Decoding and encoding walk the same fields
    /// in the same order, so a freshly parsed class writes back the exact
    /// bytes it was parsed from.
    pub fn write(&self, sink: impl Write) -> Result<()> {
        Writer::new(sink).write_class_file(self)
    }

    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.access_flags)
    }

    pub fn class_name(&self) -> Result<Cow<'_, str>> {
        // The value of the this_class item must be a valid index into the constant_pool table.
        // The constant_pool entry at that index must be a CONSTANT_Class_info structure (§4.4.1)
        // representing the class or interface defined by this class file.

        let ClassInfo { name_index } =
            matches_cp_info!(self.constant_pool, self.this_class, Class)?;

        Ok(String::from_utf8_lossy(
            self.constant_pool.utf8(*name_index)?,
        ))
    }

    pub fn super_class_name(&self) -> Result<Option<Cow<'_, str>>> {
        // If the value of the super_class item is zero, then this class file must represent
        // the class Object, the only class or interface without a direct superclass.
        if self.super_class == 0 {
            return Ok(None);
        }

        let ClassInfo { name_index } =
            matches_cp_info!(self.constant_pool, self.super_class, Class)?;

        Ok(Some(String::from_utf8_lossy(
            self.constant_pool.utf8(*name_index)?,
        )))
    }

    pub fn field_name(&self, field: &FieldInfo) -> Result<Cow<'_, str>> {
        Ok(String::from_utf8_lossy(
            self.constant_pool.utf8(field.name_index)?,
        ))
    }

    pub fn field_descriptor(&self, field: &FieldInfo) -> Result<Cow<'_, str>> {
        Ok(String::from_utf8_lossy(
            self.constant_pool.utf8(field.descriptor_index)?,
        ))
    }

    pub fn method_name(&self, method: &MethodInfo) -> Result<Cow<'_, str>> {
        Ok(String::from_utf8_lossy(
            self.constant_pool.utf8(method.name_index)?,
        ))
    }

    pub fn method_descriptor(&self, method: &MethodInfo) -> Result<Cow<'_, str>> {
        Ok(String::from_utf8_lossy(
            self.constant_pool.utf8(method.descriptor_index)?,
        ))
    }
}

#[derive(Debug)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}
impl FieldInfo {
    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.access_flags)
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}
impl MethodInfo {
    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.access_flags)
    }
}
