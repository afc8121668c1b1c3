//! UniFFI bindings crate for the health-sync library
//!
//! This crate wraps health-sync for UniFFI library mode binding generation.
//! It re-exports the FFI module and UniFFI scaffolding from health-sync.
//!
//! ## Building for Swift
//!
//! 1. Build the library for Apple platforms:
//!    ```bash
//!    cargo build --release -p health-sync-ffi --target aarch64-apple-ios
//!    cargo build --release -p health-sync-ffi --target aarch64-apple-ios-sim
//!    ```
//!
//! 2. Generate Swift bindings:
//!    ```bash
//!    cargo run -p health-sync-ffi --features bindgen --bin uniffi-bindgen generate \
//!        --library target/aarch64-apple-ios/release/libhealth_sync_ffi.a \
//!        --language swift \
//!        --out-dir generated/swift
//!    ```
//!
//! ## Building for Android
//!
//! Build with cargo-ndk for each ABI, then generate with `--language kotlin`
//! against one of the resulting `libhealth_sync_ffi.so` files.

// Re-export everything from health-sync's FFI module
pub use health_sync::ffi::*;

// Re-export the uniffi scaffolding from health-sync
// This is needed for library mode to work correctly
health_sync::uniffi_reexport_scaffolding!();
