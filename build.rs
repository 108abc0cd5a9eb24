use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let include_dir = Path::new(&crate_dir).join("include");
    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();

    // Header generation is best effort.
    if let Ok(bindings) = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        if std::fs::create_dir_all(&include_dir).is_ok() {
            bindings.write_to_file(include_dir.join("liberty.h"));
        }
    }
}
