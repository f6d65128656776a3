use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=TESSERACT_LIB_DIR");
    println!("cargo:rerun-if-env-changed=TESSERACT_LIB_NAME");

    if env::var_os("CARGO_FEATURE_TESSERACT").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("TESSERACT_LIB_DIR") {
        let dir = PathBuf::from(dir);
        if !dir.is_dir() {
            panic!("TESSERACT_LIB_DIR is not a directory: {}", dir.display());
        }
        println!("cargo:rustc-link-search=native={}", dir.display());
    }

    let name = env::var("TESSERACT_LIB_NAME").unwrap_or_else(|_| "tesseract".to_string());
    let name = name.trim();
    if name.is_empty() {
        panic!("TESSERACT_LIB_NAME is empty");
    }
    println!("cargo:rustc-link-lib={name}");
}
