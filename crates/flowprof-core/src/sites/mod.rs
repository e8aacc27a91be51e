//! Site variants: the constraint producers of the graph

mod args;
mod call;
mod check_return;
mod const_read;
mod gvar_read;
mod ivar_read;
mod masgn;
mod method_decl;
mod method_def;
mod type_read;

pub use call::CallSite;
pub use check_return::CheckReturnSite;
pub use const_read::ConstReadSite;
pub use gvar_read::GVarReadSite;
pub use ivar_read::IVarReadSite;
pub use masgn::MAsgnSite;
pub use method_decl::MethodDeclSite;
pub use method_def::{FormalArgs, MethodDefSite};
pub use type_read::TypeReadSite;
