//! Structure Registry: type-driven conversion between wire values and native objects

pub mod builtin;
pub mod convert;
pub mod hooks;
pub mod registration;
pub mod registry;

pub use convert::{Args, Returns, Shrunk, boundary_args, expand_inputs, expand_outputs, shrink_outputs};
pub use registration::{
    ChoiceStructure, GlobalStructure, RegisterOptions, Structure, StructureCandidate, StructureRegistration
};
pub use registry::{PortOptions, StructureRegistry};
