use ddx::ast::{build, Expr, TranslationUnit};
use ddx::autodiff::{derive, derive_function, DeriveError, Derivative};
use ddx::compose::{compose_expr, compose_function};
use ddx::parser::{parse, parse_expr};
use ddx::scope::LexicalScope;

const SIGNATURE: &str = "float f(float x, float y, vec3 u, vec3 v, vec2 p) { return x; }";

fn unit(src: &str) -> TranslationUnit {
    parse(src).expect("source parses")
}

fn scope() -> LexicalScope {
    let unit = unit(SIGNATURE);
    LexicalScope::new(&unit).subscope(unit.function("f").expect("f is defined"))
}

fn d(src: &str, target: &str) -> Result<Expr, DeriveError> {
    derive(&parse_expr(src).expect("expression parses"), target, &scope())
}

fn derive_named(src: &str, func: &str, target: &str) -> Derivative {
    let unit = unit(src);
    let scope = LexicalScope::new(&unit);
    derive_function(unit.function(func).expect("function is defined"), target, &scope)
}

fn unavailable(derivative: Derivative) -> DeriveError {
    match derivative {
        Derivative::Unavailable { error, .. } => error,
        Derivative::Function(func) => panic!("expected a placeholder, got\n{}", compose_function(&func)),
    }
}

#[test]
fn sums_and_differences_are_linear() {
    let a = "x * y";
    let b = "sin(x) * y";
    let da = d(a, "x").expect("d(a)");
    let db = d(b, "x").expect("d(b)");
    assert_eq!(d(&format!("{a} + {b}"), "x").expect("d(a + b)"), build::add(da.clone(), db.clone()));
    assert_eq!(d(&format!("{a} - ({b})"), "x").expect("d(a - b)"), build::sub(da, Expr::Paren(Box::new(db))));
}

#[test]
fn identity_and_zero_shapes() {
    assert_eq!(compose_expr(&d("x", "x").expect("float identity")), "1.0");
    assert_eq!(compose_expr(&d("u", "u").expect("vector identity")), "vec3(1.0)");
    assert_eq!(compose_expr(&d("3", "x").expect("int literal")), "0");
    assert_eq!(compose_expr(&d("0.25", "u").expect("float literal")), "0.0");
}

#[test]
fn swizzles_and_cross_products_are_unsupported() {
    for (src, target) in [("u.xy", "x"), ("u.zyx", "u"), ("cross(u, v)", "x"), ("normalize(u)", "u")] {
        let err = d(src, target).expect_err(src);
        assert!(err.is_unsupported(), "{src}: {err}");
    }
}

#[test]
fn mismatched_vector_shapes_are_unsupported() {
    let err = unavailable(derive_named(
        "vec2 f(vec3 u, vec2 p) { return p * u.x; }",
        "f",
        "u",
    ));
    assert!(err.is_unsupported(), "{err}");
    assert!(err.to_string().contains("\"vec2\" and \"vec3\""), "{err}");
}

#[test]
fn invalid_input_reports_the_fragment() {
    let err = unavailable(derive_named("float f(float x) { return x % 2.0; }", "f", "x"));
    assert!(!err.is_unsupported());
    let text = err.to_string();
    assert!(text.starts_with("multiplicative expressions cannot have an operator of \"%\""), "{text}");
    assert!(text.ends_with("code cannot compile, cannot continue safely: \n\tx % 2.0"), "{text}");
}

#[test]
fn loops_and_discard_are_unsupported() {
    for body in [
        "for (int i = 0; i < 2; i++) { x += 1.0; } return x;",
        "while (x > 1.0) x -= 1.0; return x;",
        "if (x < 0.0) discard; return x;",
    ] {
        let src = format!("float f(float x) {{ {body} }}");
        let err = unavailable(derive_named(&src, "f", "x"));
        assert!(err.is_unsupported(), "{body}: {err}");
    }
}

#[test]
fn return_type_mismatch_is_invalid() {
    let err = unavailable(derive_named("float f(float x, vec3 u) { return u; }", "f", "x"));
    assert!(!err.is_unsupported());
    assert!(err.to_string().contains("tried to return a vec3 but needed a float"), "{err}");
}

#[test]
fn self_referencing_update_is_derived_first() {
    let Derivative::Function(func) = derive_named(
        "float f(float x) { float y = x; y = y * x; return y; }",
        "f",
        "x",
    ) else {
        panic!("f should be differentiable");
    };
    let text = compose_function(&func);
    let derivative_at = text.find("ddx_y = x * ddx_y").expect("update derivative");
    let original_at = text.find("    y = y * x;").expect("retained update");
    assert!(derivative_at < original_at, "{text}");
}

#[test]
fn compound_assignment_keeps_operator() {
    let Derivative::Function(func) = derive_named(
        "float f(float x) { float y = 1.0; y += x; y -= 2.0 * x; return y; }",
        "f",
        "x",
    ) else {
        panic!("f should be differentiable");
    };
    let text = compose_function(&func);
    assert!(text.contains("ddx_y += 1.0;"), "{text}");
    assert!(text.contains("ddx_y -= x * 0.0 + 2.0 * 1.0;"), "{text}");
}

#[test]
fn vector_zero_is_lifted() {
    let Derivative::Function(func) = derive_named(
        "vec3 f(float x, vec3 u) { vec3 w = vec3(1.0, 2.0, 3.0); w += 1.0; return x > 0.0 ? w : u; }",
        "f",
        "x",
    ) else {
        panic!("f should be differentiable");
    };
    let text = compose_function(&func);
    assert!(text.contains("vec3 ddx_w = vec3(0.0, 0.0, 0.0);"), "{text}");
    assert!(text.contains("ddx_w += vec3(0.0);"), "{text}");
    assert!(text.contains("return x > 0.0 ? ddx_w : ddx_u;"), "{text}");
}

#[test]
fn assigning_a_parameter() {
    let src = "float f(float x, float y) { y = y * x; return y; }";
    let Derivative::Function(func) = derive_named(src, "f", "x") else {
        panic!("d/dx should be available");
    };
    let text = compose_function(&func);
    assert!(text.contains("float ddx_y = 0.0;"), "{text}");
    assert!(text.contains("ddx_y = x * ddx_y + y * 1.0;"), "{text}");

    let err = unavailable(derive_named(src, "f", "y"));
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("assignments to the differentiation variable"), "{err}");
}

#[test]
fn matrix_operands_are_unsupported() {
    let err = unavailable(derive_named("vec3 f(mat3 m, vec3 v) { return m * v; }", "f", "v"));
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("matrix operands of type \"mat3\""), "{err}");

    let err = unavailable(derive_named("float f(float x, mat2 m) { return x * m[0].x; }", "f", "x"));
    assert!(err.to_string().contains("matrix column access"), "{err}");
}

#[test]
fn parameters_without_a_derivative_type_are_not_seeded() {
    let Derivative::Function(func) = derive_named("float f(float x, int n, mat3 m) { return x * 2.0; }", "f", "x") else {
        panic!("f should be differentiable");
    };
    let text = compose_function(&func);
    assert!(!text.contains("ddx_n"), "{text}");
    assert!(!text.contains("ddx_m"), "{text}");
}

#[test]
fn inout_parameters_are_unsupported() {
    let err = unavailable(derive_named("float f(float x, inout float y) { y = x; return x; }", "f", "x"));
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("output reference parameters"), "{err}");
}
