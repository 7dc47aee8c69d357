use std::io::Write;
use std::{env, fs::File, path::Path, process::Command};

/// Writes `git_description.rs` into `OUT_DIR`, defining `git_description()` and
/// `git_commit()` for the including crate.
///
/// Builds from a source tarball have no git metadata, in that case both functions
/// return "unknown".
pub fn git_description() {
    let describe = git_output(&["describe", "--dirty", "--always"]);
    let commit = git_output(&["rev-parse", "HEAD"]);

    eprintln!("Git describe output: {:?}", describe);

    let out_dir = env::var("OUT_DIR").expect("cargo always sets OUT_DIR for build scripts");
    let dest_path = Path::new(&out_dir).join("git_description.rs");
    let mut f = File::create(dest_path).expect("OUT_DIR is writable");
    writeln!(
        f,
        "pub fn git_description() -> &'static str {{\"{}\"}}\n\
         pub fn git_commit() -> &'static str {{\"{}\"}}",
        describe, commit
    )
    .expect("OUT_DIR is writable");
}

fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim_end().replace('"', ""))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
