//! Direction selector replacing the original's "stack" pointer bundle.
//!
//! spec.md §9 ("Pointer aliasing in the 'stack' bundle") calls out that
//! the source's `ec_stackT` — a struct of raw pointers into the port's
//! fields, built once per direction — is a manual-polymorphism
//! workaround rather than a semantic requirement. This crate instead
//! uses a two-variant enum and dereferences through [`crate::port::Port`]
//! on each access, matching the redesign note's suggested alternative.

/// Which physical route an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The always-present primary NIC.
    Primary,
    /// The optional secondary NIC, present only in redundant mode.
    Secondary,
}

impl Direction {
    pub fn is_primary(self) -> bool {
        matches!(self, Direction::Primary)
    }
}
