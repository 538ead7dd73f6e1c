use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn project(root: &Path) -> Result<(), Box<dyn Error>> {
    fs::write(root.join("a.txt"), "alpha line\n")?;
    fs::write(root.join("b.txt"), "bravo line\n")?;
    fs::write(root.join("c.txt"), "charlie line\n")?;
    Ok(())
}

#[test]
fn closing_active_middle_tab_selects_right_neighbour() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    project(dir.path())?;

    Command::cargo_bin("tabshell-cli")?
        .args([
            "session",
            "--root",
            dir.path().to_str().unwrap(),
            "open:a.txt",
            "open:b.txt",
            "open:c.txt",
            "open:b.txt",
            "close:b.txt",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Tabs (2):\n  a.txt\n* c.txt\n")
                .and(predicate::str::contains("Active: c.txt\ncharlie line")),
        );
    Ok(())
}

#[test]
fn closing_last_tab_shows_fallback() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    project(dir.path())?;
    let config = dir.path().join("tabshell.json");
    fs::write(&config, r#"{ "fallback_content": "Open something!" }"#)?;

    Command::cargo_bin("tabshell-cli")?
        .args([
            "--config",
            config.to_str().unwrap(),
            "session",
            "--root",
            dir.path().to_str().unwrap(),
            "open:a.txt",
            "close:a.txt",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Tabs (0):")
                .and(predicate::str::contains("Active: (none)\nOpen something!")),
        );
    Ok(())
}

#[test]
fn unknown_entries_and_bad_actions_fail() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    project(dir.path())?;

    Command::cargo_bin("tabshell-cli")?
        .args([
            "session",
            "--root",
            dir.path().to_str().unwrap(),
            "open:zzz.txt",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not part of the scanned project"));

    Command::cargo_bin("tabshell-cli")?
        .args([
            "session",
            "--root",
            dir.path().to_str().unwrap(),
            "rename:a.txt",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid action"));
    Ok(())
}
