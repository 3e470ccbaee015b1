//! Small helpers shared by the drivers

use core::convert::Infallible;

/// Unwrap results of operations that cannot fail
///
/// Mostly GPIO writes, which embedded-hal models as fallible.
pub trait InfallibleResult<T> {
    fn infallible(self) -> T;
}

impl<T> InfallibleResult<T> for Result<T, Infallible> {
    fn infallible(self) -> T {
        self.unwrap_or_else(|never| match never {})
    }
}
