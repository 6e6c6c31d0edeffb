use std::path::PathBuf;

const BUILTIN_PROTOS: &[&str] = &["bridge/samples.proto"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    // protox keeps the build free of a protoc install.
    let mut compiler = protox::Compiler::new(["proto"])?;
    compiler
        .include_imports(true)
        .include_source_info(true)
        .open_files(BUILTIN_PROTOS)?;

    std::fs::write(
        out_dir.join("builtin_descriptor.bin"),
        compiler.encode_file_descriptor_set(),
    )?;

    prost_build::Config::new()
        .out_dir(&out_dir)
        .compile_fds(compiler.file_descriptor_set())?;

    for proto in BUILTIN_PROTOS {
        println!("cargo:rerun-if-changed=proto/{proto}");
    }

    Ok(())
}
