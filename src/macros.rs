// SPDX note: none carried — the teacher repo has no license header.

/// Define an enum that wraps an integer primitive, with a fallback
/// `Unknown(T)` variant for values with no named constant.
///
/// This is the teacher's own pattern (used, but never defined, in
/// `wire::ip::Protocol`, `wire::arp::Operation`/`Hardware`, `wire::icmpv4::Message`).
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $( $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $( #[$enum_attr] )*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant ),+,
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),+,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),+,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// A level-gated log line that turns into nothing when logging isn't wanted.
///
/// Mirrors the `net_trace!` call sites the teacher already left in
/// `iface/interface/mod.rs`'s `check!` macro.
macro_rules! net_trace {
    ($($arg:expr),*) => { log::trace!($($arg),*) }
}

macro_rules! net_debug {
    ($($arg:expr),*) => { log::debug!($($arg),*) }
}

macro_rules! net_warn {
    ($($arg:expr),*) => { log::warn!($($arg),*) }
}
