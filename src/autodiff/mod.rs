// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the DDX project (analytic derivatives for shading code).

//! Symbolic differentiation of GLSL functions.
//!
//! Derivatives are built at the tree level, one (function, parameter) pair at
//! a time, without evaluating anything. The entry point is
//! [`derive_function`], which turns a parsed [`FunctionDecl`](crate::ast::FunctionDecl)
//! into either a new function named `dd{x}_{f}` or an inert placeholder
//! comment explaining which construct could not be differentiated.
//!
//! Only component-wise dependence is modelled: component `i` of a vector
//! result may depend on component `i` of a vector parameter and on scalars,
//! never on other components. Every rule relies on this.

pub mod builtins;
mod engine;
mod rules;
pub mod shape;

pub use engine::{
    derivative_fn_name, derivative_var_name, derive_function, derive_function_with, placeholder,
    try_derive_function, DeriveConfig, DeriveError, Derivative, DEFAULT_MAX_DEPTH,
};
pub use rules::{derive, Differentiator};
pub use shape::{component_index, resolve};
