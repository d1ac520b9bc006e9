use std::process::Command;

// Exposes the build commit and its date to the status output. Packagers can
// pin both through CLOCKD_GIT_REV and CLOCKD_GIT_DATE.
fn main() {
    let dirty = Command::new("git")
        .args(["diff-index", "--quiet", "HEAD", "--"])
        .status()
        .map(|status| !status.success())
        .unwrap_or(false);

    let rev = std::env::var("CLOCKD_GIT_REV").ok().or_else(|| {
        output_of("git", &["rev-parse", "HEAD"])
            .map(|rev| if dirty { format!("{rev}-dirty") } else { rev })
    });

    let date = std::env::var("CLOCKD_GIT_DATE").ok().or_else(|| match &rev {
        Some(_) if dirty => output_of("date", &["-u", "+%Y-%m-%d"]),
        Some(rev) => output_of(
            "git",
            &["show", "-s", "--date=format:%Y-%m-%d", "--format=%cd", rev, "--"],
        ),
        None => None,
    });

    println!(
        "cargo:rustc-env=CLOCKD_GIT_REV={}",
        rev.as_deref().unwrap_or("-")
    );
    println!(
        "cargo:rustc-env=CLOCKD_GIT_DATE={}",
        date.as_deref().unwrap_or("-")
    );
    println!("cargo:rerun-if-changed=.git/HEAD");
}

fn output_of(cmd: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(cmd).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|out| out.trim().to_owned())
}
