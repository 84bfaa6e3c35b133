use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::{Builder, NamedTempFile};

fn scene_file() -> NamedTempFile {
    let scene = r#"<scene>
  <object>
    <id>cube</id>
    <name>Cube</name>
    <type>mesh</type>
    <script>[
      {"type": "moveTo", "parameters": {"position": "1, 2, 3"}},
      {"type": "emitEvent", "parameters": {"name": "ready", "payload": 5}}
    ]</script>
    <object>
      <name>Lid</name>
      <type>group</type>
      <position>0 1 0</position>
    </object>
  </object>
</scene>
"#;
    let mut tmp = Builder::new().suffix(".xml").tempfile().expect("temp scene");
    tmp.write_all(scene.as_bytes()).expect("write scene");
    tmp
}

fn stagecraft() -> Command {
    Command::cargo_bin("stagecraft").expect("binary exists")
}

#[test]
fn cli_runs_scripts_and_prints_final_state() {
    let scene = scene_file();
    stagecraft()
        .arg(scene.path())
        .args(["--frames", "2"])
        .assert()
        .success()
        .stdout(contains("Loaded scene with 2 objects"))
        .stdout(contains(" - Cube (mesh)"))
        .stdout(contains("   - Lid (group)"))
        .stdout(contains("Simulated 2 frame(s)"))
        .stdout(contains("Event ready from cube"))
        .stdout(contains("Final object states:"))
        .stdout(contains(" - Cube pos=(1.00, 2.00, 3.00) rot=(0.00, 0.00, 0.00)"))
        .stdout(contains(" - Lid pos=(1.00, 3.00, 3.00)"));
}

#[test]
fn cli_reads_json_scenes_and_config() {
    let mut scene = Builder::new().suffix(".json").tempfile().expect("temp scene");
    scene
        .write_all(
            br#"{"objects": [{"id": "ball", "name": "Ball", "type": "mesh", "position": [0, 10, 0],
                 "physics": {"shape": {"kind": "ball", "radius": 0.5}}}]}"#,
        )
        .expect("write scene");
    let mut config = NamedTempFile::new().expect("temp config");
    config
        .write_all(br#"{"gravity": [0, 0, 0], "frames": 3, "logFilter": "warn"}"#)
        .expect("write config");

    stagecraft()
        .arg(scene.path())
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(contains("Loaded scene with 1 objects"))
        .stdout(contains("Simulated 3 frame(s)"))
        .stdout(contains(" - Ball pos=(0.00, 10.00, 0.00)"));
}

#[test]
fn cli_dumps_compiled_ops() {
    let scene = scene_file();
    stagecraft()
        .arg(scene.path())
        .args(["--frames", "0", "--dump-ops"])
        .assert()
        .success()
        .stdout(contains("Compiled script of Cube:"))
        .stdout(contains("moveTo"));
}

#[test]
fn cli_requires_a_scene_path() {
    stagecraft()
        .assert()
        .failure()
        .stderr(contains("Usage: stagecraft"));
}

#[test]
fn cli_rejects_unknown_arguments_and_bad_deltas() {
    let scene = scene_file();
    stagecraft()
        .arg(scene.path())
        .arg("--fast")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --fast"));
    stagecraft()
        .arg(scene.path())
        .args(["--delta", "-1"])
        .assert()
        .failure()
        .stderr(contains("frame delta must be positive"));
}

#[test]
fn cli_reports_unreadable_scenes() {
    stagecraft()
        .arg("/definitely/not/here.xml")
        .assert()
        .failure()
        .stderr(contains("failed to read scene").and(contains("here.xml")));
}
