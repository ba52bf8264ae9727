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

//! Cleanup passes over generated derivative code.
//!
//! Raw derivatives are full of `* 1.0`, `+ 0.0` and `vec3(0.0, d, 0.0).y`
//! terms. [`simplify_function`] removes them without changing types.

pub mod fold;
pub mod simplify;

pub use simplify::{simplify_expr, simplify_function, simplify_stmt, MAX_PASSES};
