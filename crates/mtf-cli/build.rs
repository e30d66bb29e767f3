use std::process::Command;

fn git_sha() -> String {
    if let Ok(sha) = std::env::var("GITHUB_SHA") {
        let s = sha.trim();
        if !s.is_empty() {
            return s.chars().take(12).collect();
        }
    }

    // Best-effort local build: derive from git.
    let out = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output();
    if let Ok(out) = out {
        if out.status.success() {
            let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !s.is_empty() {
                return s;
            }
        }
    }
    "unknown".to_string()
}

fn main() {
    println!("cargo:rustc-env=MTF_GIT_SHA={}", git_sha());
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");
}
