// SPDX-License-Identifier: Apache-2.0 OR MIT
//! End-to-end runs of the `tpl` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `tpl` command isolated from the user's configuration and terminal.
fn tpl(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tpl").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

#[test]
fn version_flag() {
    let dir = workspace(&[]);
    tpl(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tpl"));
}

#[test]
fn exec_renders_to_stdout() {
    let dir = workspace(&[
        ("data.yaml", "db:\n  host: localhost\n"),
        ("app.tpl", "host={{ .db.host }}\n"),
    ]);
    tpl(dir.path())
        .args(["exec", "-d", "data.yaml", "app.tpl"])
        .assert()
        .success()
        .stdout("host=localhost\n");
}

#[test]
fn exec_separates_files_and_shows_origin() {
    let dir = workspace(&[("a.tpl", "A\n"), ("b.tpl", "B\n")]);
    tpl(dir.path())
        .args(["exec", "-s", "a.tpl", "b.tpl"])
        .assert()
        .success()
        .stdout("'a.tpl' is processed\nA\n\n'b.tpl' is processed\nB\n");
}

#[test]
fn exec_missing_key_without_interactive_fails() {
    let dir = workspace(&[
        ("data.yaml", "a:\n  b: 1\n"),
        ("t.tpl", "b: {{ .a.b }}\nc: {{ .a.c }}\n"),
    ]);
    tpl(dir.path())
        .args(["exec", "-d", "data.yaml", "t.tpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("interactive mode is disabled"))
        .stderr(predicate::str::contains(".a.c"));
}

#[test]
fn exec_default_policy_prints_sentinel() {
    let dir = workspace(&[("data.yaml", "a:\n  b: 1\n"), ("t.tpl", "c: {{ .a.c }}\n")]);
    tpl(dir.path())
        .args(["exec", "-d", "data.yaml", "-m", "default", "t.tpl"])
        .assert()
        .success()
        .stdout("c: <no value>\n");
}

#[test]
fn exec_interactive_asks_once_per_key() {
    let dir = workspace(&[(
        "t.tpl",
        "server:\n  name: {{ .name }}\n  alias: {{ .name }}\n",
    )]);
    tpl(dir.path())
        .args(["exec", "-i", "t.tpl"])
        .write_stdin("web\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[t.tpl]\nmissing key found\nserver:\n  name: {{ .name }}\nvalue for '.name': \n",
        ))
        .stdout(predicate::str::contains("server:\n  name: web\n  alias: web\n"))
        .stdout(predicate::str::contains("value for '.name'").count(1));
}

#[test]
fn exec_interactive_exports_answers() {
    let dir = workspace(&[("t.tpl", "{{ .user }}\n")]);
    tpl(dir.path())
        .args(["exec", "-i", "-c", "-x", "answers.kv", "--outdir", "out", "t.tpl"])
        .write_stdin("me\n")
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(dir.path().join("answers.kv")).unwrap(),
        "user=me\n"
    );
    assert_eq!(fs::read_to_string(dir.path().join("out/t")).unwrap(), "me\n");
}

#[test]
fn exec_declined_overwrite_keeps_file() {
    let dir = workspace(&[("t.tpl", "new\n"), ("result.txt", "old\n")]);
    tpl(dir.path())
        .args(["exec", "-o", "result.txt", "t.tpl"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("tpl: overwrite 'result.txt'? "))
        .stderr(predicate::str::contains("skipped 'result.txt'"));
    assert_eq!(
        fs::read_to_string(dir.path().join("result.txt")).unwrap(),
        "old\n"
    );
}

#[test]
fn exec_rejects_out_with_several_templates() {
    let dir = workspace(&[("a.tpl", "a"), ("b.tpl", "b")]);
    tpl(dir.path())
        .args(["exec", "-o", "x.txt", "a.tpl", "b.tpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outdir"));
}

#[test]
fn exec_rejects_unknown_policy() {
    let dir = workspace(&[("a.tpl", "a")]);
    tpl(dir.path())
        .args(["exec", "-m", "loose", "a.tpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown missing-key policy"));
}

#[test]
fn exec_reads_env_prefix() {
    let dir = workspace(&[("t.tpl", "{{ .env.TPL_TEST_USER }}\n")]);
    tpl(dir.path())
        .env("TPL_TEST_USER", "alice")
        .args(["exec", "-p", "env", "t.tpl"])
        .assert()
        .success()
        .stdout("alice\n");
}

#[test]
fn ensure_reports_missing_key() {
    let dir = workspace(&[
        ("data.yaml", "a:\n  b: 1\n"),
        ("good.tpl", "{{ .a.b }}\n"),
        ("bad.tpl", "{{ .a.c }}\n"),
    ]);
    tpl(dir.path())
        .args(["ensure", "-d", "data.yaml", "good.tpl"])
        .assert()
        .success()
        .stdout("there is no missing key\n");
    tpl(dir.path())
        .args(["ensure", "-d", "data.yaml", "good.tpl", "bad.tpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing key found in 'bad.tpl': .a.c"));
}

#[test]
fn keys_lists_missing_as_kv() {
    let dir = workspace(&[
        ("data.yaml", "a:\n  b: 1\n"),
        ("t.tpl", "{{ .a.b }} {{ .a.c }} {{ .z }}\n"),
    ]);
    tpl(dir.path())
        .args(["keys", "-d", "data.yaml", "-t", "kv", "t.tpl"])
        .assert()
        .success()
        .stdout("a.b=1\na.c=\nz=\n");
    tpl(dir.path())
        .args(["keys", "-d", "data.yaml", "-t", "kv", "-m", "t.tpl"])
        .assert()
        .success()
        .stdout("a.c=\nz=\n");
}

#[test]
fn keys_yaml_by_default() {
    let dir = workspace(&[("t.tpl", "{{ .a.b }}\n")]);
    tpl(dir.path())
        .args(["keys", "t.tpl"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("---\n\na:\n  b: ''\n"));
}

#[test]
fn config_file_turns_on_interactive() {
    let dir = workspace(&[
        (".tpl.yaml", "tpl:\n  interactive: true\n  fold-context: false\n"),
        ("t.tpl", "{{ .who }}\n"),
    ]);
    tpl(dir.path())
        .args(["exec", "t.tpl"])
        .write_stdin("cfg\n")
        .assert()
        .success()
        .stdout("[t.tpl]\n{{ .who }}\nvalue for '.who': cfg\n");
}

#[test]
fn completion_script() {
    let dir = workspace(&[]);
    tpl(dir.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tpl"));
}
