use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("keyward"));
    cmd.env_remove("KEYWARD_PIN")
        .env_remove("KEYWARD_PASSPHRASE")
        .env_remove("KEYWARD_STORE")
        .env_remove("KEYWARD_CONFIG")
        .env_remove("KEYWARD_WATERMARK");
    cmd
}

fn init(store: &Path, extra: &[&str]) {
    bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(store)
        .arg("init")
        .args(["--argon-mem", "1024", "--argon-time", "1"])
        .args(extra)
        .assert()
        .success()
        .stdout(predicate::str::contains("vault initialized"));
}

fn encrypt(store: &Path, value: &str) -> String {
    let output = bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(store)
        .arg("encrypt")
        .arg(value)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).unwrap().trim().to_string()
}

#[test]
fn init_creates_vault_and_key_files() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");

    init(&store, &[]);

    assert!(store.exists());
    assert!(dir.path().join("vault.keys").exists());
}

#[test]
fn encrypt_and_decrypt_roundtrip() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    let envelope = encrypt(&store, "github.com");
    assert!(!envelope.contains("github.com"));

    bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(&store)
        .arg("decrypt")
        .arg(&envelope)
        .assert()
        .success()
        .stdout(predicate::str::contains("github.com"));
}

#[test]
fn init_fails_if_vault_exists() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(&store)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("keyward vault already exists"));
}

#[test]
fn short_pin_is_rejected() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");

    bin()
        .env("KEYWARD_PIN", "12")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(&store)
        .arg("init")
        .args(["--argon-mem", "1024", "--argon-time", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 4 characters"));
}

#[test]
fn wrong_pin_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    bin()
        .env("KEYWARD_PIN", "9999")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(&store)
        .arg("encrypt")
        .arg("A")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid PIN or passphrase (attempt 1 of 3)"));
}

#[test]
fn wrong_passphrase_fails() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "wrong")
        .arg("--store")
        .arg(&store)
        .arg("encrypt")
        .arg("A")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid PIN or passphrase"));
}

#[test]
fn actions_fail_if_vault_missing() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");

    bin()
        .env("KEYWARD_PIN", "1234")
        .arg("--store")
        .arg(&store)
        .arg("encrypt")
        .arg("A")
        .assert()
        .failure()
        .stderr(predicate::str::contains("vault does not exist"));
}

#[test]
fn passphrase_can_be_piped() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    bin()
        .env("KEYWARD_PIN", "1234")
        .arg("--store")
        .arg(&store)
        .arg("encrypt")
        .arg("A")
        .write_stdin("pass phrase\n")
        .assert()
        .success();
}

#[test]
fn cached_passphrase_allows_pin_only_unlock() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &["--cache-passphrase"]);

    bin()
        .env("KEYWARD_PIN", "1234")
        .arg("--store")
        .arg(&store)
        .arg("encrypt")
        .arg("A")
        .assert()
        .success();

    bin()
        .arg("--store")
        .arg(&store)
        .arg("forget-passphrase")
        .assert()
        .success()
        .stdout(predicate::str::contains("cached passphrase removed"));

    bin()
        .env("KEYWARD_PIN", "1234")
        .arg("--store")
        .arg(&store)
        .arg("encrypt")
        .arg("A")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no Passphrase provided"));
}

#[test]
fn lockout_removes_cached_passphrase() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    let config = dir.path().join("keyward.json");
    std::fs::write(&config, br#"{ "max_login_attempts": 1 }"#).unwrap();
    init(&store, &["--cache-passphrase"]);

    bin()
        .env("KEYWARD_PIN", "0000")
        .arg("--store")
        .arg(&store)
        .arg("--config")
        .arg(&config)
        .arg("encrypt")
        .arg("A")
        .assert()
        .failure()
        .stderr(predicate::str::contains("too many failed unlock attempts"));

    bin()
        .arg("--store")
        .arg(&store)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cached passphrase: no"));
}

#[test]
fn status_shows_vault_information() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &["--cache-passphrase"]);

    bin()
        .arg("--store")
        .arg(&store)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Key store:         software"))
        .stdout(predicate::str::contains("Cached passphrase: yes"))
        .stdout(predicate::str::contains("Max attempts:      3"));
}

#[test]
fn export_key_prints_envelope() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(&store)
        .arg("export-key")
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[A-Za-z0-9+/=]{40,}\n$").unwrap());
}

#[test]
fn drop_needs_confirmation_and_removes_files() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");
    init(&store, &[]);

    bin()
        .arg("--store")
        .arg(&store)
        .arg("drop")
        .assert()
        .failure()
        .stderr(predicate::str::contains("without --yes"));

    bin()
        .arg("--store")
        .arg(&store)
        .arg("drop")
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("vault dropped"));

    assert!(!store.exists());
    assert!(!dir.path().join("vault.keys").exists());

    init(&store, &[]);
}

#[test]
fn obfuscate_roundtrip() {
    let output = bin()
        .arg("watermark")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let watermark = String::from_utf8(output).unwrap().trim().to_string();

    let output = bin()
        .arg("obfuscate")
        .arg("--watermark")
        .arg(&watermark)
        .arg("hunter2!")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let shown = String::from_utf8(output).unwrap();
    let shown = shown.strip_suffix('\n').unwrap();
    assert_eq!(shown.chars().count(), "hunter2!".len());

    bin()
        .env("KEYWARD_WATERMARK", &watermark)
        .arg("deobfuscate")
        .arg("--")
        .arg(shown)
        .assert()
        .success()
        .stdout("hunter2!\n");
}

#[test]
fn invalid_argon2_parameters_fail() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("vault.json");

    bin()
        .env("KEYWARD_PIN", "1234")
        .env("KEYWARD_PASSPHRASE", "pass phrase")
        .arg("--store")
        .arg(&store)
        .arg("init")
        .arg("--argon-mem")
        .arg("4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("memory cost too low"));
}
