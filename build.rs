use std::process::Command;

/// `PACPROXY_VERSION`: the package version, plus the git revision when built
/// from a checkout.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let package = env!("CARGO_PKG_VERSION");
    let version = match git_revision() {
        Some(revision) => format!("{} ({})", package, revision),
        None => package.to_string(),
    };
    println!("cargo:rustc-env=PACPROXY_VERSION={}", version);
}

fn git_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--exclude", "*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!revision.is_empty()).then_some(revision)
}
