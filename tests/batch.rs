use ddx::ast::Item;
use ddx::autodiff::Derivative;
use ddx::compose::compose;
use ddx::parser;
use ddx::pipeline::{convert_source, convert_text, convert_unit, DeriveOptions, InputHandling, PipelineError};

const MIXED: &str = "\
uniform float k;
float good(float x) {
    return k * x * x;
}
float bad(vec3 u) {
    return length(u.xy);
}
";

fn function_names(opts: &DeriveOptions, src: &str) -> Vec<String> {
    convert_source(src, opts)
        .expect("conversion succeeds")
        .unit
        .functions()
        .map(|f| f.name.clone())
        .collect()
}

#[test]
fn unsupported_function_becomes_placeholder() {
    let conversion = convert_source(MIXED, &DeriveOptions::default()).expect("conversion succeeds");
    assert_eq!(conversion.stats.functions, 2);
    assert_eq!(conversion.stats.derivatives, 1);
    assert_eq!(conversion.stats.placeholders, 1);

    let names: Vec<&str> = conversion.derivatives.iter().map(Derivative::name).collect();
    assert_eq!(names, ["ddx_good", "ddu_bad"]);
    let Derivative::Unavailable { error, .. } = &conversion.derivatives[1] else {
        panic!("bad() should not be differentiable");
    };
    assert!(error.is_unsupported());

    let text = compose(&conversion.unit);
    assert!(text.contains("float ddx_good(float x) {"), "{text}");
    assert!(text.contains("/*\n Derivative \"ddu_bad\" not available:\n"), "{text}");
    assert!(text.contains("swizzling"), "{text}");
}

#[test]
fn placement_modes() {
    let src = "uniform float k;\nfloat f(float x) { return k * x; }\nfloat g(float y) { return y; }\n";
    let embed = DeriveOptions::default();
    assert_eq!(function_names(&embed, src), ["f", "ddx_f", "g", "ddy_g"]);

    let prepend = DeriveOptions {
        input_handling: InputHandling::Prepend,
        ..DeriveOptions::default()
    };
    assert_eq!(function_names(&prepend, src), ["f", "g", "ddx_f", "ddy_g"]);

    let omit = DeriveOptions {
        input_handling: InputHandling::Omit,
        ..DeriveOptions::default()
    };
    assert_eq!(function_names(&omit, src), ["ddx_f", "ddy_g"]);

    // non-function items survive in every mode
    for opts in [embed, prepend, omit] {
        let unit = convert_source(src, &opts).expect("conversion succeeds").unit;
        assert!(matches!(unit.items.first(), Some(Item::Declaration(_))));
    }
}

#[test]
fn one_derivative_per_parameter_in_order() {
    let src = "float f(float a, vec2 b, float c) { return a * c + b.x; }";
    let names = function_names(&DeriveOptions::default(), src);
    assert_eq!(names, ["f", "dda_f", "ddb_f", "ddc_f"]);
}

#[test]
fn conversion_leaves_input_untouched_and_is_deterministic() {
    let unit = parser::parse(MIXED).expect("parse");
    let before = compose(&unit);
    let first = convert_unit(&unit, &DeriveOptions::default()).expect("first run");
    let second = convert_unit(&unit, &DeriveOptions::default()).expect("second run");
    assert_eq!(compose(&unit), before);
    assert_eq!(compose(&first.unit), compose(&second.unit));
    assert_eq!(first.derivatives, second.derivatives);
}

#[test]
fn output_composes_to_a_fixed_point() {
    let text = convert_text(MIXED, &DeriveOptions::default()).expect("conversion succeeds");
    let reparsed = parser::parse(&text).expect("output parses");
    assert_eq!(compose(&reparsed), text);
}

#[test]
fn unsimplified_output_keeps_identity_factors() {
    let src = "float f(float x) { return x * x; }";
    let raw = convert_text(
        src,
        &DeriveOptions {
            simplify: false,
            input_handling: InputHandling::Omit,
            ..DeriveOptions::default()
        },
    )
    .expect("conversion succeeds");
    assert!(raw.contains("return x * 1.0 + x * 1.0;"), "{raw}");

    let simplified = convert_text(
        src,
        &DeriveOptions {
            input_handling: InputHandling::Omit,
            ..DeriveOptions::default()
        },
    )
    .expect("conversion succeeds");
    assert!(simplified.contains("return x + x;"), "{simplified}");
}

#[test]
fn local_declaration_keeps_original_and_returns_derivative_variable() {
    let src = "float f(float x) { float y = x * x; return y; }";
    let text = convert_text(
        src,
        &DeriveOptions {
            input_handling: InputHandling::Omit,
            ..DeriveOptions::default()
        },
    )
    .expect("conversion succeeds");
    let expected = "float ddx_f(float x) {\n    float y = x * x;\n    float ddx_y = x + x;\n    return ddx_y;\n}\n";
    assert_eq!(text, expected);
}

#[test]
fn depth_guard_is_isolated_per_function() {
    let mut deep = String::from("x");
    for _ in 0..64 {
        deep = format!("({deep} + x)");
    }
    let src = format!("float deep(float x) {{ return {deep}; }}\nfloat ok(float x) {{ return x; }}\n");
    let conversion = convert_source(
        &src,
        &DeriveOptions {
            max_depth: 32,
            ..DeriveOptions::default()
        },
    )
    .expect("conversion succeeds");
    assert_eq!(conversion.stats.placeholders, 1);
    assert_eq!(conversion.stats.derivatives, 1);
    assert!(!conversion.derivatives[0].is_available());
}

#[test]
fn reassigned_target_is_isolated_per_function() {
    let src = "float f(float x) { x = x * x; return x; }\nfloat g(float y) { return y; }\n";
    let conversion = convert_source(src, &DeriveOptions::default()).expect("conversion succeeds");
    assert_eq!(conversion.stats.derivatives, 1);
    assert_eq!(conversion.stats.placeholders, 1);

    let names: Vec<&str> = conversion.derivatives.iter().map(Derivative::name).collect();
    assert_eq!(names, ["ddx_f", "ddy_g"]);
    assert!(!conversion.derivatives[0].is_available());

    let text = compose(&conversion.unit);
    assert!(text.contains("assignments to the differentiation variable"), "{text}");
    assert!(text.contains("float ddy_g(float y) {"), "{text}");
}

#[test]
fn matrix_products_become_placeholders() {
    let src = "vec3 f(mat3 m, vec3 v) { return m * v; }\n";
    let conversion = convert_source(src, &DeriveOptions::default()).expect("conversion succeeds");
    assert_eq!(conversion.stats.derivatives, 0);
    assert_eq!(conversion.stats.placeholders, 2);
    let text = compose(&conversion.unit);
    assert!(!text.contains("ddv_m"), "{text}");
    assert!(text.contains("matrix operands"), "{text}");
}

#[test]
fn parse_errors_are_reported() {
    let err = convert_source("float f(float x) { return x +; }", &DeriveOptions::default())
        .expect_err("malformed input");
    assert!(
        matches!(&err, PipelineError::Parse(diags) if !diags.is_empty()),
        "expected a parse error, got {err:?}"
    );
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_matches_sequential() {
    let src = format!("{MIXED}\nvec3 h(float t, vec3 a) {{ return a * sin(t) + a * t; }}\n");
    let sequential = convert_text(&src, &DeriveOptions::default()).expect("sequential");
    let parallel = convert_text(
        &src,
        &DeriveOptions {
            parallel: true,
            threads: Some(2),
            ..DeriveOptions::default()
        },
    )
    .expect("parallel");
    assert_eq!(sequential, parallel);
}

#[cfg(feature = "parallel")]
#[test]
fn zero_threads_is_rejected() {
    let err = convert_source(
        MIXED,
        &DeriveOptions {
            parallel: true,
            threads: Some(0),
            ..DeriveOptions::default()
        },
    )
    .expect_err("zero workers");
    assert!(matches!(err, PipelineError::ThreadPool(_)));
}
