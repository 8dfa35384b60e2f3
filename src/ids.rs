//! Opaque identifier types for the cell model
//!
//! Cell types, cell addresses, reservation ids, and virtual cluster names are
//! all strings on the wire, but they are never interchangeable: assigning a
//! reservation id where a cell address belongs is a bug this module makes a
//! compile error. Each identifier is a transparent newtype that serializes as
//! a plain string.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from any string-like value
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// The identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is the empty string
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier! {
    /// Names a class of hardware cell (e.g., a GPU model, a PCIe switch
    /// group, a node)
    CellType
}

identifier! {
    /// Path-like coordinate locating a cell instance within its tree.
    ///
    /// A physical cell address consists of its address (or index) at each
    /// level, e.g. `node0/0/0/0` may represent node0, CPU socket 0, PCIe
    /// switch 0, GPU 0. A virtual cell address consists of the VC name, the
    /// index of the preassigned cell, and the relative index at each level
    /// inside the preassigned cell, e.g. `VC1/0/0`.
    CellAddress
}

identifier! {
    /// Names a standing reservation of physical capacity outside normal
    /// virtual-cluster accounting
    ReservationId
}

identifier! {
    /// Names a tenant's virtual cluster
    VirtualClusterName
}

impl CellAddress {
    /// Address of the synthetic opportunistic virtual cell projected from a
    /// physical cell at this address
    pub fn opportunistic(&self) -> CellAddress {
        CellAddress(format!("{}{}", self.0, crate::OPPORTUNISTIC_CELL_SUFFIX))
    }
}
