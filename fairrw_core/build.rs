fn main() {
    use std::env;
    use std::path::PathBuf;

    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let out_dir = PathBuf::from(&crate_dir).join("include");

    let config = match cbindgen::Config::from_file(PathBuf::from(&crate_dir).join("cbindgen.toml")) {
        Ok(config) => config,
        Err(e) => {
            println!("cargo:warning=cbindgen.toml unreadable, header not generated: {e}");
            return;
        }
    };

    let generated = cbindgen::Builder::new()
        .with_config(config)
        .with_crate(&crate_dir)
        .generate();
    match generated {
        Ok(bindings) => {
            if let Err(e) = std::fs::create_dir_all(&out_dir) {
                println!("cargo:warning=cannot create {}: {e}", out_dir.display());
                return;
            }
            bindings.write_to_file(out_dir.join("fairrw.h"));
        }
        Err(e) => println!("cargo:warning=unable to generate C bindings: {e}"),
    }
}
