// Build script for the clap_to_find native library
//
// The Android build links the Oboe backend, which needs the shared C++ runtime.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Ensure Android builds link against libc++_shared so symbols like
    // __cxa_pure_virtual resolve correctly on all ABIs (arm/x86).
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
