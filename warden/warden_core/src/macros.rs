//! Convenience macros for the Warden engine.

/// Emit a security debug event if its category is enabled.
///
/// The category check is a relaxed atomic load, so the macro is free on the
/// hot path when the category is off. Events go to the `warden::security`
/// tracing target.
///
/// # Examples
///
/// ```
/// use warden_core::security_debug;
/// use warden_core::utils::DebugFlags;
///
/// security_debug!(DebugFlags::ACCESS, "access allowed {}", "(runtime \"exitVM.0\")");
/// ```
#[macro_export]
macro_rules! security_debug {
    ($flags:expr, $($arg:tt)+) => {
        if $crate::utils::logging::enabled($flags) {
            $crate::__tracing::debug!(target: "warden::security", $($arg)+);
        }
    };
}

/// Return early with a denial unless `$collection` implies `$permission`.
///
/// # Examples
///
/// ```
/// use warden_core::{ensure_implied, Result};
/// use warden_core::traits::{Permission, PermissionCollection};
///
/// fn guard(grants: &dyn PermissionCollection, wanted: &dyn Permission) -> Result<()> {
///     ensure_implied!(grants, wanted);
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure_implied {
    ($collection:expr, $permission:expr) => {
        if !$collection.implies($permission) {
            return Err($crate::error::AccessError::denied($permission, None).into());
        }
    };
}
