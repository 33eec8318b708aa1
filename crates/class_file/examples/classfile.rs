use std::{env, fs::File, process};

use jbin_class_file::ClassFile;

fn main() {
    pretty_env_logger::init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: classfile <input.class> [output.class]");
        process::exit(2);
    };

    let file = File::open(&path).unwrap();
    let class_file = ClassFile::parse(file).unwrap();

    println!("Class:     {}", class_file.class_name().unwrap());
    match class_file.super_class_name().unwrap() {
        Some(name) => println!("Extends:   {}", name),
        None => println!("Extends:   <none>"),
    }
    println!(
        "Version:   {}.{}",
        class_file.major_version, class_file.minor_version
    );
    println!("Flags:     {:?}", class_file.flags());
    println!("Constants: {}", class_file.constant_pool.iter().count());

    println!();
    println!("Fields:");
    for field in &class_file.fields {
        println!(
            "    {} : {}",
            class_file.field_name(field).unwrap(),
            class_file.field_descriptor(field).unwrap()
        );
    }

    println!();
    println!("Methods:");
    for method in &class_file.methods {
        println!(
            "    {} : {}",
            class_file.method_name(method).unwrap(),
            class_file.method_descriptor(method).unwrap()
        );
    }

    if let Some(out_path) = args.next() {
        let out = File::create(&out_path).unwrap();
        class_file.write(out).unwrap();
        println!();
        println!("Rewritten to {}", out_path);
    }
}
