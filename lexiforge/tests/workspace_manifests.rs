use std::fs;
use std::path::PathBuf;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("lexiforge crate should live at workspace root/lexiforge")
        .to_path_buf()
}

fn contains_line(content: &str, expected: &str) -> bool {
    content.lines().any(|line| line.trim() == expected)
}

#[test]
fn library_crates_inherit_workspace_package_metadata() {
    let root = workspace_root();

    for member in [
        "lexiforge",
        "lexiforge-core",
        "lexiforge-llm",
        "lexiforge-cache",
        "lexiforge-batch",
    ] {
        let manifest = fs::read_to_string(root.join(member).join("Cargo.toml"))
            .unwrap_or_else(|err| panic!("{member}/Cargo.toml must be readable: {err}"));
        for expected in [
            "version.workspace = true",
            "edition.workspace = true",
            "license.workspace = true",
            "rust-version.workspace = true",
        ] {
            assert!(
                contains_line(&manifest, expected),
                "{member} is missing `{expected}`"
            );
        }
    }
}

#[test]
fn workspace_lists_every_member() {
    let manifest =
        fs::read_to_string(workspace_root().join("Cargo.toml")).expect("root manifest");
    for member in [
        "\"lexiforge\",",
        "\"lexiforge-core\",",
        "\"lexiforge-llm\",",
        "\"lexiforge-cache\",",
        "\"lexiforge-batch\",",
        "\"demos\",",
    ] {
        assert!(contains_line(&manifest, member), "workspace is missing {member}");
    }
}

#[test]
fn llm_crate_needs_tokio_only_for_tests() {
    let manifest = fs::read_to_string(workspace_root().join("lexiforge-llm").join("Cargo.toml"))
        .expect("lexiforge-llm manifest");
    let dependencies = manifest
        .split("[dependencies]")
        .nth(1)
        .and_then(|rest| rest.split("\n[").next())
        .expect("[dependencies] table");

    assert!(
        !dependencies.lines().any(|line| line.trim_start().starts_with("tokio")),
        "lexiforge-llm should not depend on tokio outside [dev-dependencies]"
    );
    assert!(manifest.contains("[dev-dependencies]"));
}
