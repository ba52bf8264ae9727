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

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::tempdir;

const SOURCE: &str = "float f(float x) {\n    return x * x;\n}\n";

fn ddx() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ddx"));
    cmd.env_remove("DDX_LOG").env_remove("DDX_COLOR");
    cmd
}

fn run_with_stdin(args: &[&str], input: &str) -> Output {
    let mut child = ddx()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn ddx");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait for ddx")
}

#[test]
fn converts_a_file_to_stdout() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("shader.glsl");
    fs::write(&path, SOURCE).expect("write shader");

    let output = ddx().arg("-f").arg(&path).output().expect("run ddx");
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(stdout.starts_with(SOURCE), "{stdout}");
    assert!(stdout.contains("float ddx_f(float x) {\n    return x + x;\n}"), "{stdout}");
    assert_eq!(fs::read_to_string(&path).expect("read shader"), SOURCE);
}

#[test]
fn rewrites_in_place() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("shader.glsl");
    fs::write(&path, SOURCE).expect("write shader");

    let output = ddx()
        .arg("--filename")
        .arg(&path)
        .args(["--in-place", "--input-handling", "omit"])
        .output()
        .expect("run ddx");
    assert!(output.status.success(), "{output:?}");
    assert!(output.stdout.is_empty());
    let rewritten = fs::read_to_string(&path).expect("read shader");
    assert_eq!(rewritten, "float ddx_f(float x) {\n    return x + x;\n}\n");
}

#[test]
fn reads_stdin_and_prints_a_diff() {
    let output = run_with_stdin(&["-v", "--color", "never", "--no-simplify"], SOURCE);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(stdout.contains("+ float ddx_f(float x) {"), "{stdout}");
    assert!(stdout.contains("+     return x * 1.0 + x * 1.0;"), "{stdout}");
    assert!(stdout.contains("  float f(float x) {"), "{stdout}");
    assert!(!stdout.contains('\x1b'), "{stdout}");
}

#[test]
fn parse_errors_exit_with_status_one() {
    let output = run_with_stdin(&[], "float f(float x) {\n    return x +;\n}\n");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("utf-8 output");
    assert!(stderr.contains("error: "), "{stderr}");
    assert!(stderr.contains("--> <input>:"), "{stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn placeholders_are_logged_not_fatal() {
    let src = "float f(vec3 u) {\n    return length(u.xy);\n}\n";
    let output = run_with_stdin(&[], src);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(stdout.contains("Derivative \"ddu_f\" not available"), "{stdout}");
    let stderr = String::from_utf8(output.stderr).expect("utf-8 output");
    assert!(stderr.contains("derivative replaced by placeholder"), "{stderr}");
}

#[test]
fn in_place_needs_a_file() {
    let output = run_with_stdin(&["-i"], SOURCE);
    assert!(!output.status.success());
}
