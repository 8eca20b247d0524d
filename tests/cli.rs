use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_create_list_extract_cycle() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup: Create a temporary directory and some test files
    let source_dir = tempdir()?;
    let file1_path = source_dir.path().join("file1.txt");
    let nested_dir = source_dir.path().join("nested");
    fs::create_dir(&nested_dir)?;
    let nested_file_path = nested_dir.join("nested_file.dat");

    let mut file1 = fs::File::create(&file1_path)?;
    writeln!(file1, "Hello, this is the first file.")?;

    let mut nested_file = fs::File::create(&nested_file_path)?;
    nested_file.write_all(&vec![42u8; 3 * 4096 + 11])?;

    let archive_dir = tempdir()?;
    let archive_path = archive_dir.path().join("test_archive.car");

    // 2. Create archive
    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-c").arg("-f").arg(&archive_path).arg(source_dir.path());
    cmd.assert().success();

    assert!(archive_path.exists());

    // 3. List contents of the archive
    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-t").arg("-f").arg(&archive_path);
    cmd.assert().success().stdout(
        predicate::str::contains("file1.txt")
            .and(predicate::str::contains("nested/nested_file.dat"))
            .and(predicate::str::contains("12299")),
    );

    // 4. Extract archive to a new directory, forcing the copy path
    let extract_dir = tempdir()?;
    let target = extract_dir.path().join("restored");
    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-x").arg("--no-reflink").arg("-f").arg(&archive_path).arg(&target);
    cmd.assert().success();

    // 5. Verify extracted files
    assert_eq!(fs::read(target.join("file1.txt"))?, fs::read(&file1_path)?);
    assert_eq!(fs::read(target.join("nested/nested_file.dat"))?, fs::read(&nested_file_path)?);

    Ok(())
}

#[test]
fn test_cli_rejects_two_modes() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("car")?;
    cmd.args(["-c", "-x", "-f", "a.car", "somewhere"]);
    cmd.assert().code(1).stderr(predicate::str::contains("cannot be used with"));
    Ok(())
}

#[test]
fn test_cli_requires_a_mode() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("car")?;
    cmd.args(["-f", "a.car", "somewhere"]);
    cmd.assert().code(1);
    Ok(())
}

#[test]
fn test_cli_create_requires_a_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-c").arg("-f").arg(dir.path().join("a.car"));
    cmd.assert().code(1).stderr(predicate::str::contains("PATH"));
    assert!(!dir.path().join("a.car").exists());
    Ok(())
}

#[test]
fn test_cli_archives_several_paths() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir(&first)?;
    fs::create_dir(&second)?;
    fs::write(first.join("a.txt"), b"alpha")?;
    fs::write(second.join("b.txt"), b"beta")?;
    let archive = dir.path().join("both.car");

    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-c").arg("-f").arg(&archive).arg(&first).arg(&second);
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-t").arg("-f").arg(&archive);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("first/a.txt").and(predicate::str::contains("second/b.txt")));

    let out = dir.path().join("out");
    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-x").arg("-f").arg(&archive).arg(&out);
    cmd.assert().success();
    assert_eq!(fs::read(out.join("first/a.txt"))?, b"alpha");
    assert_eq!(fs::read(out.join("second/b.txt"))?, b"beta");
    Ok(())
}

#[test]
fn test_cli_reports_bad_archive() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let bogus = dir.path().join("bogus.car");
    fs::write(&bogus, b"definitely not an archive")?;

    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("-x").arg("-f").arg(&bogus).arg(dir.path().join("out"));
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("invalid archive"));
    assert!(!dir.path().join("out").exists());
    Ok(())
}

#[test]
fn test_cli_help_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("car")?;
    cmd.arg("--help");
    cmd.assert().success().stdout(predicate::str::contains("--no-reflink"));
    Ok(())
}
