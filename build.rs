use std::env;
use std::process::Command;

/// Short commit hash from the environment, else from git
fn git_sha() -> Option<String> {
    if let Ok(sha) = env::var("GENFEAT_GIT_SHA") {
        let sha = sha.trim().to_string();
        return (!sha.is_empty()).then_some(sha);
    }
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    println!("cargo:rerun-if-env-changed=GENFEAT_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");

    if let Some(sha) = git_sha() {
        println!("cargo:rustc-env=GENFEAT_GIT_SHA={}", sha);
    }
}
