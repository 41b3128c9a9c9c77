// tests/config_loading.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scriptrun::config::{
    load_and_validate, load_from_path, resolve, Overrides, DEFAULT_INTERPRETER,
    DEFAULT_SCRIPT_FLAG, INTERPRETER_ENV_VAR,
};
use scriptrun::errors::ScriptRunError;
use scriptrun_test_utils::ConfigBuilder;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("Scriptrun.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn full_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[interpreter]
path = "/usr/local/bin/kotlinc"
script_flag = "-script"
args = ["-nowarn"]
working_dir = "/srv/scripts"

[scratch]
dir = "/tmp/scriptrun"
prefix = "run"
extension = "main.kts"

[session]
output_buffer = 1024
drain_timeout_ms = 250
"#,
    );

    let config = load_and_validate(&path).unwrap();
    assert_eq!(config.interpreter.path, "/usr/local/bin/kotlinc");
    assert_eq!(config.interpreter.args, vec!["-nowarn"]);
    assert_eq!(
        config.interpreter.working_dir.as_deref(),
        Some(Path::new("/srv/scripts"))
    );
    assert_eq!(config.scratch.dir, PathBuf::from("/tmp/scriptrun"));
    assert_eq!(config.scratch.prefix, "run");
    assert_eq!(config.scratch.extension, "main.kts");

    let options = config.session.options();
    assert_eq!(options.output_buffer, 1024);
    assert_eq!(options.drain_timeout, Duration::from_millis(250));
}

#[test]
fn empty_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = load_and_validate(&path).unwrap();
    assert_eq!(config.interpreter.path, DEFAULT_INTERPRETER);
    assert_eq!(config.interpreter.script_flag, DEFAULT_SCRIPT_FLAG);
    assert!(config.interpreter.args.is_empty());
    assert_eq!(config.scratch.dir, PathBuf::from("."));
    assert_eq!(config.scratch.prefix, "temp");
    assert_eq!(config.scratch.extension, "kts");
}

#[test]
fn partial_section_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[interpreter]\npath = \"kotlin\"\n");

    let config = load_and_validate(&path).unwrap();
    assert_eq!(config.interpreter.path, "kotlin");
    assert_eq!(config.interpreter.script_flag, DEFAULT_SCRIPT_FLAG);
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[interpreter\npath = ");

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ScriptRunError::TomlError(_)), "{err:?}");
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = resolve(Some(missing.as_path()), &Overrides::default(), no_env).unwrap_err();
    assert!(matches!(err, ScriptRunError::IoError(_)), "{err:?}");
}

#[test]
fn validation_names_the_offending_key() {
    let dir = TempDir::new().unwrap();
    for (contents, key) in [
        ("[interpreter]\npath = \"\"\n", "[interpreter].path"),
        ("[interpreter]\nscript_flag = \" \"\n", "[interpreter].script_flag"),
        ("[scratch]\nprefix = \"a/b\"\n", "[scratch].prefix"),
        ("[scratch]\nextension = \"..\\\\kts\"\n", "[scratch].extension"),
        ("[session]\noutput_buffer = 0\n", "[session].output_buffer"),
        ("[session]\ndrain_timeout_ms = 0\n", "[session].drain_timeout_ms"),
    ] {
        let path = write_config(&dir, contents);
        match load_and_validate(&path) {
            Err(ScriptRunError::ConfigError(message)) => {
                assert!(message.contains(key), "{message} should name {key}")
            }
            other => panic!("expected config error for {key}, got {other:?}"),
        }
    }
}

#[test]
fn cli_interpreter_beats_env_and_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[interpreter]\npath = \"from-file\"\n");
    let overrides = Overrides {
        interpreter: Some("from-cli".to_string()),
        temp_dir: None,
    };

    let config = resolve(Some(path.as_path()), &overrides, |key| {
        (key == INTERPRETER_ENV_VAR).then(|| "from-env".to_string())
    })
    .unwrap();
    assert_eq!(config.interpreter.path, "from-cli");
}

#[test]
fn env_interpreter_beats_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[interpreter]\npath = \"from-file\"\n");

    let config = resolve(Some(path.as_path()), &Overrides::default(), |key| {
        (key == INTERPRETER_ENV_VAR).then(|| "from-env".to_string())
    })
    .unwrap();
    assert_eq!(config.interpreter.path, "from-env");
}

#[test]
fn blank_env_value_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[interpreter]\npath = \"from-file\"\n");

    let config = resolve(Some(path.as_path()), &Overrides::default(), |_| Some("  ".to_string())).unwrap();
    assert_eq!(config.interpreter.path, "from-file");
}

#[test]
fn temp_dir_override_replaces_scratch_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[scratch]\ndir = \"/from/file\"\n");
    let overrides = Overrides {
        interpreter: None,
        temp_dir: Some(PathBuf::from("/from/cli")),
    };

    let config = resolve(Some(path.as_path()), &overrides, no_env).unwrap();
    assert_eq!(config.scratch.dir, PathBuf::from("/from/cli"));
}

#[test]
fn builder_produces_valid_config() {
    let config = ConfigBuilder::new()
        .interpreter("sh")
        .script_flag("-e")
        .interpreter_arg("-x")
        .extension("sh")
        .drain_timeout_ms(10)
        .build();

    assert_eq!(config.interpreter.path, "sh");
    assert_eq!(config.interpreter.args, vec!["-x"]);
    assert_eq!(config.session.options().drain_timeout, Duration::from_millis(10));
}
