use jbin_class_file::{attributes::AttributeInfo, AccessFlags, ClassFile, Parser};

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn push_utf8(bytes: &mut Vec<u8>, value: &str) {
    bytes.push(1);
    push_u16(bytes, value.len() as u16);
    bytes.extend_from_slice(value.as_bytes());
}

fn push_class(bytes: &mut Vec<u8>, name_index: u16) {
    bytes.push(7);
    push_u16(bytes, name_index);
}

fn push_attribute(bytes: &mut Vec<u8>, name_index: u16, body: &[u8]) {
    push_u16(bytes, name_index);
    push_u32(bytes, body.len() as u32);
    bytes.extend_from_slice(body);
}

fn code_attribute_body(code: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    push_u16(&mut body, 1); // max_stack
    push_u16(&mut body, 1); // max_locals
    push_u32(&mut body, code.len() as u32);
    body.extend_from_slice(code);
    push_u16(&mut body, 0); // exception_table_length
    push_u16(&mut body, 0); // attributes_count
    body
}

/// A hand-assembled image of
///
/// ```java
/// public class MyClass {
///     private final int myField = 0;
///     public float add(int x) { .. }
/// }
/// ```
fn class_file_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    push_u32(&mut bytes, 0xCAFEBABE);
    push_u16(&mut bytes, 0); // minor_version
    push_u16(&mut bytes, 52); // major_version

    push_u16(&mut bytes, 14); // constant_pool_count
    push_utf8(&mut bytes, "my/MyClass"); // 1
    push_class(&mut bytes, 1); // 2
    push_utf8(&mut bytes, "java/lang/Object"); // 3
    push_class(&mut bytes, 3); // 4
    push_utf8(&mut bytes, "myField"); // 5
    push_utf8(&mut bytes, "I"); // 6
    push_utf8(&mut bytes, "<init>"); // 7
    push_utf8(&mut bytes, "()V"); // 8
    push_utf8(&mut bytes, "add"); // 9
    push_utf8(&mut bytes, "(I)F"); // 10
    push_utf8(&mut bytes, "Code"); // 11
    push_utf8(&mut bytes, "SourceFile"); // 12
    push_utf8(&mut bytes, "MyClass.java"); // 13

    push_u16(&mut bytes, 0x0021); // access_flags: PUBLIC | SUPER
    push_u16(&mut bytes, 2); // this_class
    push_u16(&mut bytes, 4); // super_class
    push_u16(&mut bytes, 0); // interfaces_count

    push_u16(&mut bytes, 1); // fields_count
    push_u16(&mut bytes, 0x0012); // PRIVATE | FINAL
    push_u16(&mut bytes, 5);
    push_u16(&mut bytes, 6);
    push_u16(&mut bytes, 0); // attributes_count

    push_u16(&mut bytes, 2); // methods_count

    push_u16(&mut bytes, 0x0001); // PUBLIC
    push_u16(&mut bytes, 7);
    push_u16(&mut bytes, 8);
    push_u16(&mut bytes, 1);
    push_attribute(&mut bytes, 11, &code_attribute_body(&[0xb1]));

    push_u16(&mut bytes, 0x0001); // PUBLIC
    push_u16(&mut bytes, 9);
    push_u16(&mut bytes, 10);
    push_u16(&mut bytes, 1);
    push_attribute(&mut bytes, 11, &code_attribute_body(&[0x1b, 0x86, 0xae]));

    push_u16(&mut bytes, 1); // attributes_count
    let mut source_file = Vec::new();
    push_u16(&mut source_file, 13);
    push_attribute(&mut bytes, 12, &source_file);

    bytes
}

fn with_class_file(f: impl FnOnce(ClassFile)) {
    f(Parser::new(&class_file_bytes()[..]).parse().unwrap());
}

#[test]
fn test_super_class() {
    with_class_file(|class_file| {
        assert_eq!(
            "java/lang/Object",
            class_file.super_class_name().unwrap().unwrap()
        )
    });
}

#[test]
fn test_class_name() {
    with_class_file(|class_file| assert_eq!("my/MyClass", class_file.class_name().unwrap()));
}

#[test]
fn test_field_name() {
    with_class_file(|class_file| {
        assert_eq!(
            "myField",
            class_file.field_name(&class_file.fields[0]).unwrap()
        )
    });
}

#[test]
fn test_int_field_type() {
    with_class_file(|class_file| {
        assert_eq!(
            "I",
            class_file.field_descriptor(&class_file.fields[0]).unwrap()
        )
    });
}

#[test]
fn test_field_access_flags() {
    with_class_file(|class_file| {
        assert_eq!(
            AccessFlags::FINAL | AccessFlags::PRIVATE,
            class_file.fields[0].flags()
        )
    });
}

#[test]
fn test_constructor_name() {
    with_class_file(|class_file| {
        assert_eq!(
            "<init>",
            class_file.method_name(&class_file.methods[0]).unwrap()
        )
    });
}

#[test]
fn test_constructor_descriptor() {
    with_class_file(|class_file| {
        assert_eq!(
            "()V",
            class_file
                .method_descriptor(&class_file.methods[0])
                .unwrap()
        )
    });
}

#[test]
fn test_method_name() {
    with_class_file(|class_file| {
        assert_eq!(
            "add",
            class_file.method_name(&class_file.methods[1]).unwrap()
        )
    });
}

#[test]
fn test_method_descriptor() {
    with_class_file(|class_file| {
        assert_eq!(
            "(I)F",
            class_file
                .method_descriptor(&class_file.methods[1])
                .unwrap()
        )
    });
}

#[test]
fn test_method_access_flags() {
    with_class_file(|class_file| {
        assert_eq!(AccessFlags::PUBLIC, class_file.methods[1].flags())
    });
}

#[test]
fn test_version_pair() {
    with_class_file(|class_file| {
        assert_eq!(52, class_file.major_version);
        assert_eq!(0, class_file.minor_version);
    });
}

#[test]
fn test_code_attribute() {
    with_class_file(|class_file| {
        let code = class_file.methods[1]
            .attributes
            .code_attribute()
            .expect("add has a Code attribute");
        assert_eq!(1, code.max_stack);
        assert_eq!(vec![0x1b, 0x86, 0xae], code.code);
    });
}

#[test]
fn test_find_attribute_by_name() {
    with_class_file(|class_file| {
        let attribute = class_file
            .attributes
            .find_by_name("SourceFile", &class_file.constant_pool)
            .expect("class has a SourceFile attribute");
        match attribute.info {
            AttributeInfo::SourceFile { source_file_index } => {
                assert_eq!(
                    b"MyClass.java",
                    class_file.constant_pool.utf8(source_file_index).unwrap()
                );
            }
            ref info => panic!("unexpected attribute: {:?}", info),
        }
    });
}
