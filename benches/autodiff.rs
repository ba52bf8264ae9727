use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ddx::autodiff::derive_function;
use ddx::parser;
use ddx::pipeline::{convert_text, convert_unit, DeriveOptions};
use ddx::scope::LexicalScope;

/// Polynomial with a local accumulator
const POLYNOMIAL: &str = r#"
float poly(float x, float a, float b) {
    float y = a * x * x;
    y += b * x;
    y = y * x + 1.0;
    return y;
}
"#;

/// Signed distance field of a rounded box and a sphere
const SDF: &str = r#"
uniform float radius;

float sphere(vec3 p, float r) {
    return sqrt(p.x * p.x + p.y * p.y + p.z * p.z) - r;
}

float blend(float a, float b, float k) {
    float h = max(k - abs(a - b), 0.0) / k;
    return min(a, b) - h * h * k * 0.25;
}

float scene(vec3 p, float t) {
    float d = sphere(p, radius) + sin(t * p.x) * 0.1;
    if (d > 1.0) {
        d = d - 0.5;
    }
    return d;
}
"#;

/// Lighting terms with vector parameters
const SHADING: &str = r#"
float lambert(vec3 n, vec3 l) {
    return max(dot(n, l), 0.0);
}

float phong(vec3 r, vec3 v, float shininess) {
    return pow(max(dot(r, v), 0.0), shininess);
}

vec3 tint(vec3 albedo, float t) {
    return albedo * cos(t) + albedo * t * t;
}
"#;

fn bench_derive_function(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_function");

    for (name, source, func, target) in [
        ("polynomial", POLYNOMIAL, "poly", "x"),
        ("sdf_blend", SDF, "blend", "a"),
        ("phong", SHADING, "phong", "r"),
    ] {
        let unit = parser::parse(source).expect("parse failed");
        let scope = LexicalScope::new(&unit);
        let decl = unit.function(func).expect("missing function");

        group.bench_with_input(BenchmarkId::new("single", name), decl, |b, decl| {
            b.iter(|| derive_function(black_box(decl), target, &scope));
        });
    }

    group.finish();
}

fn bench_convert_unit(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_unit");

    for (name, source) in [("polynomial", POLYNOMIAL), ("sdf", SDF), ("shading", SHADING)] {
        let unit = parser::parse(source).expect("parse failed");

        group.bench_with_input(BenchmarkId::new("simplified", name), &unit, |b, unit| {
            b.iter(|| convert_unit(black_box(unit), &DeriveOptions::default()).expect("conversion failed"));
        });

        let raw = DeriveOptions {
            simplify: false,
            ..DeriveOptions::default()
        };
        group.bench_with_input(BenchmarkId::new("raw", name), &unit, |b, unit| {
            b.iter(|| convert_unit(black_box(unit), &raw).expect("conversion failed"));
        });
    }

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    let source = format!("{POLYNOMIAL}\n{SDF}\n{SHADING}");

    group.bench_function("sequential", |b| {
        b.iter(|| convert_text(black_box(&source), &DeriveOptions::default()).expect("conversion failed"));
    });

    #[cfg(feature = "parallel")]
    {
        let parallel = DeriveOptions {
            parallel: true,
            ..DeriveOptions::default()
        };
        group.bench_function("parallel", |b| {
            b.iter(|| convert_text(black_box(&source), &parallel).expect("conversion failed"));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_derive_function,
    bench_convert_unit,
    bench_end_to_end
);
criterion_main!(benches);
