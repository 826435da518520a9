//! `cxx` bridge to the libtorrent shim.

#![allow(unreachable_pub)]

pub mod bridge;

#[allow(unsafe_code)]
#[allow(clippy::non_send_fields_in_send_ty)]
// SAFETY: the shim wraps an `lt::session`, which is internally synchronised, and the
// Rust side only reaches it through the `Mutex` held by `NativeEngine`.
unsafe impl Send for bridge::ffi::Session {}
