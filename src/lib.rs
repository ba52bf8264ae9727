//! DDX core library: analytic derivatives of procedural GLSL functions.
//!
//! Parse a translation unit with [`parser`], differentiate it with
//! [`pipeline::convert_unit`] (or the lower-level [`autodiff`] entry points)
//! and print the result with [`compose`].
pub mod ast;
pub mod autodiff;
pub mod compose;
pub mod diagnostics;
pub mod eval;
pub mod lexer;
pub mod opt;
pub mod parser;
pub mod pipeline;
pub mod scope;
pub mod types;
pub mod verify;
