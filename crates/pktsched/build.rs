fn main() {
    for (var, exported) in [
        ("TARGET", "PKTSCHED_BUILD_TARGET"),
        ("PROFILE", "PKTSCHED_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(var) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={var}");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
