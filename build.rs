use std::process::Command;

fn main() {
    let commit = command_output("git", &["rev-parse", "--short", "HEAD"]);
    let build_time = command_output("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]);
    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=DAILYBLOG_GIT_COMMIT={commit}");
    println!("cargo:rustc-env=DAILYBLOG_BUILD_TIME={build_time}");
    println!("cargo:rustc-env=DAILYBLOG_BUILD_TARGET={target}");
    println!("cargo:rustc-env=DAILYBLOG_BUILD_PROFILE={profile}");

    // sqlx::migrate! 在编译期嵌入迁移文件
    println!("cargo:rerun-if-changed=migrations");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

/// 执行外部命令取其输出，失败时返回 "unknown"
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
