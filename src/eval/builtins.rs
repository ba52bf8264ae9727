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

//! Built-in functions of the reference interpreter.

use super::value::Value;
use super::EvalError;

/// Evaluate built-in `name`, or `Ok(None)` when there is no such built-in.
pub fn call(name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
    let value = match name {
        "sqrt" => map1(name, args, f64::sqrt)?,
        "inversesqrt" => map1(name, args, |x| 1.0 / x.sqrt())?,
        "log" => map1(name, args, f64::ln)?,
        "log2" => map1(name, args, f64::log2)?,
        "exp" => map1(name, args, f64::exp)?,
        "exp2" => map1(name, args, f64::exp2)?,
        "sin" => map1(name, args, f64::sin)?,
        "cos" => map1(name, args, f64::cos)?,
        "tan" => map1(name, args, f64::tan)?,
        "asin" => map1(name, args, f64::asin)?,
        "acos" => map1(name, args, f64::acos)?,
        "atan" if args.len() == 2 => map2(name, args, f64::atan2)?,
        "atan" => map1(name, args, f64::atan)?,
        "sinh" => map1(name, args, f64::sinh)?,
        "cosh" => map1(name, args, f64::cosh)?,
        "tanh" => map1(name, args, f64::tanh)?,
        "radians" => map1(name, args, f64::to_radians)?,
        "degrees" => map1(name, args, f64::to_degrees)?,
        "abs" => map1(name, args, f64::abs)?,
        "sign" => map1(name, args, sign)?,
        "floor" => map1(name, args, f64::floor)?,
        "ceil" => map1(name, args, f64::ceil)?,
        "fract" => map1(name, args, |x| x - x.floor())?,
        "pow" => map2(name, args, f64::powf)?,
        "min" => map2(name, args, f64::min)?,
        "max" => map2(name, args, f64::max)?,
        "mod" => map2(name, args, |x, y| x - y * (x / y).floor())?,
        "step" => map2(name, args, |edge, x| if x < edge { 0.0 } else { 1.0 })?,
        "clamp" => map3(name, args, |x, lo, hi| x.max(lo).min(hi))?,
        "mix" => map3(name, args, |a, b, t| a * (1.0 - t) + b * t)?,
        "smoothstep" => map3(name, args, |e0, e1, x| {
            let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        })?,
        "dot" => {
            let [a, b] = vectors::<2>(name, args)?;
            Value::Float(dot(&a, &b))
        }
        "length" => {
            let [a] = vectors::<1>(name, args)?;
            Value::Float(dot(&a, &a).sqrt())
        }
        "distance" => {
            let [a, b] = vectors::<2>(name, args)?;
            let d: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
            Value::Float(dot(&d, &d).sqrt())
        }
        "normalize" => {
            let [a] = vectors::<1>(name, args)?;
            let len = dot(&a, &a).sqrt();
            shaped(&args[0], a.iter().map(|x| x / len).collect())
        }
        "cross" => {
            let [a, b] = vectors::<2>(name, args)?;
            if a.len() != 3 {
                return Err(EvalError::TypeError("cross needs two vec3".into()));
            }
            Value::vec([
                a[1] * b[2] - a[2] * b[1],
                a[2] * b[0] - a[0] * b[2],
                a[0] * b[1] - a[1] * b[0],
            ])
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            found: args.len(),
        })
    }
}

/// Scalars stay scalars, everything else comes back as a vector.
fn shaped(like: &Value, components: Vec<f64>) -> Value {
    match (like, components.as_slice()) {
        (Value::Vector(_), _) => Value::Vector(components),
        (_, [single]) => Value::Float(*single),
        _ => Value::Vector(components),
    }
}

/// Component lists of `args`, with scalars broadcast to the widest vector.
fn broadcast(args: &[Value]) -> Result<(usize, Vec<Vec<f64>>, bool), EvalError> {
    let lists = args
        .iter()
        .map(Value::components)
        .collect::<Result<Vec<_>, _>>()?;
    let width = lists.iter().map(Vec::len).max().unwrap_or(1);
    let any_vector = args.iter().any(|a| matches!(a, Value::Vector(_)));
    let lists = lists
        .into_iter()
        .map(|c| match c.as_slice() {
            [single] => Ok(vec![*single; width]),
            _ if c.len() == width => Ok(c),
            _ => Err(EvalError::TypeError(format!(
                "cannot combine vectors of {} and {width} components",
                c.len()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((width, lists, any_vector))
}

fn finish(components: Vec<f64>, any_vector: bool) -> Value {
    if any_vector {
        Value::Vector(components)
    } else {
        Value::Float(components.first().copied().unwrap_or_default())
    }
}

fn map1(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value, EvalError> {
    arity(name, args, 1)?;
    let (_, lists, any_vector) = broadcast(args)?;
    Ok(finish(lists[0].iter().map(|x| f(*x)).collect(), any_vector))
}

fn map2(name: &str, args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    arity(name, args, 2)?;
    let (width, lists, any_vector) = broadcast(args)?;
    let out = (0..width).map(|i| f(lists[0][i], lists[1][i])).collect();
    Ok(finish(out, any_vector))
}

fn map3(
    name: &str,
    args: &[Value],
    f: impl Fn(f64, f64, f64) -> f64,
) -> Result<Value, EvalError> {
    arity(name, args, 3)?;
    let (width, lists, any_vector) = broadcast(args)?;
    let out = (0..width)
        .map(|i| f(lists[0][i], lists[1][i], lists[2][i]))
        .collect();
    Ok(finish(out, any_vector))
}

/// Exactly `N` vectors of equal size. A lone scalar counts as a
/// one-component vector.
fn vectors<const N: usize>(name: &str, args: &[Value]) -> Result<[Vec<f64>; N], EvalError> {
    arity(name, args, N)?;
    let lists = args
        .iter()
        .map(Value::components)
        .collect::<Result<Vec<_>, _>>()?;
    if lists.windows(2).any(|w| w[0].len() != w[1].len()) {
        return Err(EvalError::TypeError(format!(
            "{name} needs vectors of equal size"
        )));
    }
    lists
        .try_into()
        .map_err(|_| EvalError::TypeError(format!("{name} takes {N} vectors")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(name: &str, args: &[Value]) -> Value {
        call(name, args).unwrap().expect("known built-in")
    }

    #[test]
    fn component_wise_with_broadcast() {
        assert_eq!(
            eval("max", &[Value::vec([1.0, 5.0]), Value::Float(2.0)]),
            Value::vec([2.0, 5.0])
        );
        assert_eq!(eval("sqrt", &[Value::Int(9)]), Value::Float(3.0));
        assert_eq!(
            eval("clamp", &[Value::Float(3.0), Value::Float(0.0), Value::Float(1.0)]),
            Value::Float(1.0)
        );
    }

    #[test]
    fn geometric() {
        let u = Value::vec([1.0, 2.0, 2.0]);
        assert_eq!(eval("length", &[u.clone()]), Value::Float(3.0));
        assert_eq!(eval("dot", &[u.clone(), u.clone()]), Value::Float(9.0));
        assert_eq!(
            eval("cross", &[Value::vec([1.0, 0.0, 0.0]), Value::vec([0.0, 1.0, 0.0])]),
            Value::vec([0.0, 0.0, 1.0])
        );
    }

    #[test]
    fn unknown_and_bad_arity() {
        assert_eq!(call("noise", &[Value::Float(1.0)]).unwrap(), None);
        assert!(matches!(
            call("pow", &[Value::Float(1.0)]),
            Err(EvalError::Arity { expected: 2, found: 1, .. })
        ));
    }
}
