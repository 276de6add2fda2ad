//! Macros for wrapping an inner value into a newtype.

/// Implement [core::ops::Deref] and [core::ops::DerefMut] from a newtype with an `inner` field
/// to the wrapped type.
#[macro_export]
macro_rules! impl_deref {
    ($name: ident, $type: ty) => {
        impl core::ops::Deref for $name {
            type Target = $type;

            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }

        impl core::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.inner
            }
        }
    };
}

/// Implement conversions between a newtype with an `inner` field and the wrapped type.
#[macro_export]
macro_rules! impl_conversion {
    ($name: ident, $type: ty) => {
        impl core::convert::From<$type> for $name {
            fn from(value: $type) -> Self {
                $name { inner: value }
            }
        }

        impl core::convert::From<$name> for $type {
            fn from(value: $name) -> Self {
                value.inner
            }
        }
    };
}
